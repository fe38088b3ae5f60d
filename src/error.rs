//! Error types for the edgequake-pdfshrink library.
//!
//! Two types reflect the two places a failure can originate:
//!
//! * [`ShrinkError`]: every failure a caller can observe. Returned as
//!   `Err(ShrinkError)` from the `compress*` helpers and carried by
//!   [`crate::output::Outcome::Failed`].
//!
//! * [`WorkerFailure`]: the by-value payload of the protocol `error`
//!   event. A background context cannot hand an `io::Error` across the
//!   channel, so it reports one of these and the interactive side turns it
//!   back into a [`ShrinkError`].
//!
//! No variant is retried anywhere in the crate: each is either actionable by
//! the user (pick another file, confirm the warning) or a processing fault
//! that a retry would reproduce.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdfshrink library.
#[derive(Debug, Error)]
pub enum ShrinkError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input is not identified as `application/pdf`.
    #[error("'{name}' is not a PDF (detected type: {mime})\nSelect a .pdf file.")]
    NotAPdf { name: String, mime: String },

    /// The input exceeds the hard size ceiling and is never processed.
    #[error("'{name}' is {size_mb:.1} MB; files over {limit_mb} MB cannot be processed")]
    FileTooLarge {
        name: String,
        size_mb: f64,
        limit_mb: u64,
    },

    /// The input exceeds the soft size ceiling and the user has not confirmed.
    ///
    /// Resubmit the same request with `is_confirmed = true` to proceed.
    #[error(
        "'{name}' is larger than {limit_mb} MB ({size_mb:.1} MB). Processing may be slow \
or exhaust memory.\nConfirm to continue anyway."
    )]
    FileTooLargeWarning {
        name: String,
        size_mb: f64,
        limit_mb: u64,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The opened document has more pages than the configured hard limit.
    #[error("Document has {pages} pages; documents with more than {limit} pages cannot be processed")]
    PageLimitExceeded { pages: usize, limit: usize },

    /// The conversion was cancelled by the user. Not an error state for the
    /// user; callers should reset their view rather than display it.
    #[error("Conversion aborted by user")]
    AbortedByUser,

    /// The background context did not acknowledge a page in time.
    #[error("Background worker did not respond within {secs}s")]
    WorkerTimeout { secs: u64 },

    /// The renderer, encoder or document builder failed.
    #[error("Processing failed: {message}\nCheck that the file is a valid, unencrypted PDF.")]
    GenericProcessingFailure { message: String },

    /// A background execution context could not be created.
    ///
    /// Triggers topology fallback; only surfaced when a background context is
    /// required and no fallback remains.
    #[error("Background execution unavailable: {reason}")]
    BackgroundContextUnavailable { reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or option validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the \
executable, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShrinkError {
    /// Shorthand for [`ShrinkError::GenericProcessingFailure`].
    pub fn processing(message: impl Into<String>) -> Self {
        ShrinkError::GenericProcessingFailure {
            message: message.into(),
        }
    }

    /// `true` for a user-initiated cancellation.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, ShrinkError::AbortedByUser)
    }

    /// `true` when the user can fix the problem by choosing another file or
    /// confirming a warning, as opposed to a processing fault.
    pub fn is_recoverable_by_user(&self) -> bool {
        matches!(
            self,
            ShrinkError::NotAPdf { .. }
                | ShrinkError::FileTooLarge { .. }
                | ShrinkError::FileTooLargeWarning { .. }
                | ShrinkError::PageLimitExceeded { .. }
                | ShrinkError::FileNotFound { .. }
                | ShrinkError::PermissionDenied { .. }
        )
    }
}

/// Failure reported by a background context through the `error` event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerFailure {
    #[error("page limit exceeded: {pages} > {limit}")]
    PageLimitExceeded { pages: usize, limit: usize },

    #[error("{0}")]
    Processing(String),
}

impl From<&ShrinkError> for WorkerFailure {
    fn from(err: &ShrinkError) -> Self {
        match err {
            ShrinkError::PageLimitExceeded { pages, limit } => WorkerFailure::PageLimitExceeded {
                pages: *pages,
                limit: *limit,
            },
            ShrinkError::GenericProcessingFailure { message } => {
                WorkerFailure::Processing(message.clone())
            }
            other => WorkerFailure::Processing(other.to_string()),
        }
    }
}

impl From<WorkerFailure> for ShrinkError {
    fn from(failure: WorkerFailure) -> Self {
        match failure {
            WorkerFailure::PageLimitExceeded { pages, limit } => {
                ShrinkError::PageLimitExceeded { pages, limit }
            }
            WorkerFailure::Processing(message) => ShrinkError::GenericProcessingFailure { message },
        }
    }
}
