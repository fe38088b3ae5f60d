//! Conversion results: the terminal outcome, the output artifact, and the
//! summary statistics printed by the CLI.

use crate::error::ShrinkError;
use crate::pipeline::input::PDF_MIME;
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Exactly one of these ends every conversion request.
#[derive(Debug)]
pub enum Outcome {
    Done(OutputArtifact),
    /// Cancelled by the user. Not an error: the caller should reset its view.
    Aborted,
    Failed(ShrinkError),
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted)
    }

    /// `Aborted` becomes `Err(ShrinkError::AbortedByUser)`.
    pub fn into_result(self) -> Result<OutputArtifact, ShrinkError> {
        match self {
            Outcome::Done(artifact) => Ok(artifact),
            Outcome::Aborted => Err(ShrinkError::AbortedByUser),
            Outcome::Failed(err) => Err(err),
        }
    }
}

/// The compressed PDF, ready to save or hand to a download.
#[derive(Clone)]
pub struct OutputArtifact {
    bytes: Vec<u8>,
    file_name: String,
    page_count: usize,
    original_size: u64,
    topology: Topology,
    duration_ms: u64,
}

impl std::fmt::Debug for OutputArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputArtifact")
            .field("file_name", &self.file_name)
            .field("size", &self.bytes.len())
            .field("page_count", &self.page_count)
            .field("original_size", &self.original_size)
            .field("topology", &self.topology)
            .finish()
    }
}

impl OutputArtifact {
    pub fn new(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        page_count: usize,
        original_size: u64,
        topology: Topology,
        duration_ms: u64,
    ) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            page_count,
            original_size,
            topology,
            duration_ms,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Always `application/pdf`.
    pub fn mime(&self) -> &'static str {
        PDF_MIME
    }

    /// `<stem>_compressed.pdf`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Size reduction in percent, rounded. Negative when the output grew.
    pub fn reduction_percent(&self) -> i64 {
        reduction_percent(self.original_size, self.size())
    }

    pub fn summary(&self) -> ConversionSummary {
        ConversionSummary {
            file_name: self.file_name.clone(),
            page_count: self.page_count,
            original_size: self.original_size,
            compressed_size: self.size(),
            reduction_percent: self.reduction_percent(),
            topology: self.topology,
            duration_ms: self.duration_ms,
        }
    }

    /// Write atomically: temp file next to `path`, then rename.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ShrinkError> {
        let path = path.as_ref();
        let write_err = |source| ShrinkError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!("Wrote {} ({})", path.display(), format_size(self.size()));
        Ok(())
    }
}

/// Serialisable statistics for one finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub file_name: String,
    pub page_count: usize,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: i64,
    pub topology: Topology,
    pub duration_ms: u64,
}

/// Basic facts about an input file, without converting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub file_name: String,
    pub mime: String,
    pub size: u64,
    pub page_count: usize,
}

/// `round((1 - compressed / original) * 100)`; 0 for an empty original.
pub fn reduction_percent(original: u64, compressed: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    ((1.0 - compressed as f64 / original as f64) * 100.0).round() as i64
}

/// Human-readable size with two decimals: `"1.50 MB"`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[exponent])
}
