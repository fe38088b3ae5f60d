//! Input validation: identify the file as a PDF and enforce size ceilings.
//!
//! Everything here runs before any execution context is touched. A file
//! that fails these checks never reaches the renderer, never causes an
//! `init`/`start` command, and never allocates an accumulator.
//!
//! The type is identified from content (`%PDF` magic), not from the name,
//! so a renamed JPEG is still rejected with [`ShrinkError::NotAPdf`].

use crate::config::{ConversionOptions, Limits, BYTES_PER_MB, LARGE_FILE_MAX_SCALE};
use crate::error::ShrinkError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// MIME type of accepted input and of produced output.
pub const PDF_MIME: &str = "application/pdf";

/// MIME type reported for anything that is not recognised.
pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// Suffix appended to the input stem to name the output.
pub const OUTPUT_SUFFIX: &str = "_compressed";

/// A single binary input file, fully loaded into memory.
#[derive(Clone)]
pub struct InputFile {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl InputFile {
    /// Wrap bytes with an explicit MIME type (e.g. from an upload form).
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Wrap bytes, sniffing the MIME type from content.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime = sniff_mime(&bytes).to_string();
        Self::new(name, mime, bytes)
    }

    /// Read a local file and sniff its MIME type.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ShrinkError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| map_read_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size_mb(&self) -> f64 {
        self.size() as f64 / BYTES_PER_MB as f64
    }

    /// `<stem>_compressed.pdf`, where the stem drops one trailing `.pdf`.
    pub fn output_file_name(&self) -> String {
        output_file_name(&self.name)
    }
}

fn map_read_error(path: &Path, e: std::io::Error) -> ShrinkError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ShrinkError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ShrinkError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ShrinkError::Internal(format!("reading {}: {e}", path.display())),
    }
}

/// Identify PDF content by its `%PDF` header.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        PDF_MIME
    } else {
        UNKNOWN_MIME
    }
}

/// Derive the download name for a converted file.
pub fn output_file_name(input_name: &str) -> String {
    let split = input_name
        .len()
        .checked_sub(4)
        .and_then(|i| input_name.get(i..).map(|ext| (i, ext)));
    let stem = match split {
        Some((i, ext)) if ext.eq_ignore_ascii_case(".pdf") => &input_name[..i],
        _ => input_name,
    };
    format!("{stem}{OUTPUT_SUFFIX}.pdf")
}

/// Default output path: the derived name next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(output_file_name(&name))
}

/// Size classification of an input that passed the hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Normal,
    /// Above the soft ceiling; needs confirmation.
    Large,
}

/// Classify `file` against the size ceilings without looking at options.
pub fn classify_size(file: &InputFile, limits: &Limits) -> Result<SizeClass, ShrinkError> {
    if file.mime() != PDF_MIME {
        return Err(ShrinkError::NotAPdf {
            name: file.name().to_string(),
            mime: file.mime().to_string(),
        });
    }
    if file.size() > limits.max_file_size_bytes() {
        return Err(ShrinkError::FileTooLarge {
            name: file.name().to_string(),
            size_mb: file.size_mb(),
            limit_mb: limits.max_file_size_mb,
        });
    }
    if file.size() > limits.warn_file_size_bytes() {
        Ok(SizeClass::Large)
    } else {
        Ok(SizeClass::Normal)
    }
}

/// Validate an input for a conversion request.
///
/// Returns the options the pipeline should actually use: a confirmed large
/// file has its scale capped at [`LARGE_FILE_MAX_SCALE`] to bound per-page
/// pixel buffers.
pub fn check_input(
    file: &InputFile,
    limits: &Limits,
    options: &ConversionOptions,
) -> Result<ConversionOptions, ShrinkError> {
    match classify_size(file, limits)? {
        SizeClass::Normal => Ok(*options),
        SizeClass::Large if !options.is_confirmed() => Err(ShrinkError::FileTooLargeWarning {
            name: file.name().to_string(),
            size_mb: file.size_mb(),
            limit_mb: limits.warn_file_size_mb,
        }),
        SizeClass::Large => {
            let effective = options.with_scale_capped(LARGE_FILE_MAX_SCALE);
            if effective.scale() < options.scale() {
                info!(
                    "Large file confirmed; render scale lowered from {} to {}",
                    options.scale(),
                    effective.scale()
                );
            }
            Ok(effective)
        }
    }
}
