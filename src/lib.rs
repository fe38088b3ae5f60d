//! # edgequake-pdfshrink
//!
//! Shrink PDF files by rasterising every page and re-encoding it as a JPEG
//! inside a freshly built PDF.
//!
//! Scanned documents and slide decks full of embedded images often carry
//! far more resolution than anyone needs. Rendering each page at a chosen
//! scale and storing it as a single JPEG at a chosen quality trades text
//! selectability for a predictable, usually much smaller, file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     sniff %PDF magic, enforce size ceilings
//!  ├─ 2. Open      decode with pdfium, enforce page ceiling
//!  ├─ 3. Render    one page at a time, at `scale` × natural size
//!  ├─ 4. Encode    JPEG at `quality`
//!  ├─ 5. Append    full-bleed image page sized pixels / scale
//!  └─ 6. Output    serialised PDF + size statistics
//! ```
//!
//! Steps 3–5 run strictly sequentially per page, so at most one page of
//! pixels and one encoded page are alive at any moment.
//!
//! ## Execution topologies
//!
//! A [`Session`] picks once where the work happens: everything on a
//! background worker, rendering here with assembly on the worker, or
//! everything on the calling task. It falls back down that list when a
//! worker cannot be created. See [`topology`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfshrink::{compress, ConversionConfig, ConversionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConversionOptions::new(0.6, 1.5)?;
//!     let pdf = compress("scan.pdf", &ConversionConfig::default(), &options).await?;
//!     pdf.write_to(pdf.file_name()).await?;
//!     eprintln!("{}% smaller", pdf.reduction_percent());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfshrink` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfshrink = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod engines;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod topology;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationToken;
pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionOptions, Limits, TopologyPreference};
pub use convert::{compress, compress_sync, compress_to_file, inspect};
pub use engines::Engines;
pub use error::{ShrinkError, WorkerFailure};
pub use output::{format_size, ConversionSummary, DocumentInfo, Outcome, OutputArtifact};
pub use pipeline::input::InputFile;
pub use progress::{Progress, ProgressReporter, ProgressStream};
pub use session::{Session, SessionState};
pub use topology::Topology;
