//! One-call entry points for local files.
//!
//! Each call builds a pdfium-backed [`Session`], converts a single file and
//! tears the session down. Use [`Session`] directly to convert several files
//! with one background worker, to stream progress, or to cancel.

use crate::cancel::CancellationToken;
use crate::config::{ConversionConfig, ConversionOptions};
use crate::engines::Engines;
use crate::error::ShrinkError;
use crate::output::{ConversionSummary, DocumentInfo, OutputArtifact};
use crate::pipeline::input::{InputFile, PDF_MIME};
use crate::pipeline::render::{PdfiumBackend, RenderBackend};
use crate::progress::ProgressReporter;
use crate::session::Session;
use std::path::Path;
use tracing::info;

/// Compress a PDF file.
///
/// Large files are refused with [`ShrinkError::FileTooLargeWarning`] unless
/// `options` is already confirmed.
pub async fn compress(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
    options: &ConversionOptions,
) -> Result<OutputArtifact, ShrinkError> {
    let input = InputFile::from_path(path).await?;
    let mut session = Session::new(Engines::pdfium(), config.clone());
    session
        .convert(
            &input,
            options,
            &CancellationToken::new(),
            ProgressReporter::detached(),
        )
        .await
        .into_result()
}

/// Compress a PDF file and write the result to `output_path` atomically.
pub async fn compress_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
    options: &ConversionOptions,
) -> Result<ConversionSummary, ShrinkError> {
    let artifact = compress(path, config, options).await?;
    artifact.write_to(output_path).await?;
    Ok(artifact.summary())
}

/// Synchronous wrapper around [`compress`].
///
/// Creates a temporary tokio runtime internally.
pub fn compress_sync(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
    options: &ConversionOptions,
) -> Result<OutputArtifact, ShrinkError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ShrinkError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress(path, config, options))
}

/// Identify a file and count its pages without converting it.
pub async fn inspect(path: impl AsRef<Path>) -> Result<DocumentInfo, ShrinkError> {
    let input = InputFile::from_path(path).await?;
    if input.mime() != PDF_MIME {
        return Err(ShrinkError::NotAPdf {
            name: input.name().to_string(),
            mime: input.mime().to_string(),
        });
    }

    let file_name = input.name().to_string();
    let size = input.size();
    let page_count = tokio::task::spawn_blocking(move || {
        let engine = PdfiumBackend::new().engine()?;
        let source = engine.open(input.bytes())?;
        Ok::<_, ShrinkError>(source.page_count())
    })
    .await
    .map_err(|e| ShrinkError::Internal(format!("inspect task panicked: {e}")))??;

    info!("{}: {} pages, {} bytes", file_name, page_count, size);
    Ok(DocumentInfo {
        file_name,
        mime: PDF_MIME.to_string(),
        size,
        page_count,
    })
}
