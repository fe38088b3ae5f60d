//! Per-page progress events.
//!
//! [`channel`] returns a [`ProgressReporter`] that the conversion writes to
//! and a [`ProgressStream`] the caller reads from. The stream is finite: it
//! ends as soon as the conversion finishes and drops its reporter, whatever
//! the outcome. It cannot be restarted; each conversion gets a fresh pair.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfshrink::progress::{self, Progress};
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let (mut reporter, mut events) = progress::channel();
//! reporter.report(Progress { current: 1, total: 2 });
//! reporter.report(Progress { current: 2, total: 2 });
//! drop(reporter);
//!
//! let seen: Vec<Progress> = events.by_ref().collect().await;
//! assert_eq!(seen.len(), 2);
//! assert!(events.next().await.is_none());
//! # });
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// `(current_page, total_pages)`, 1-indexed, `1 ≤ current ≤ total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    /// Completion ratio in `[0, 100]`, rounded.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current as f64 / self.total as f64) * 100.0).round() as u8
    }
}

/// Lazy, finite sequence of progress events for one conversion.
pub type ProgressStream = UnboundedReceiverStream<Progress>;

/// Create a connected reporter/stream pair.
pub fn channel() -> (ProgressReporter, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressReporter { tx: Some(tx), last: 0 },
        UnboundedReceiverStream::new(rx),
    )
}

/// Write side of the progress channel.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<Progress>>,
    last: usize,
}

impl ProgressReporter {
    /// A reporter nobody listens to.
    pub fn detached() -> Self {
        Self { tx: None, last: 0 }
    }

    /// Emit one event. A dropped stream is not an error: the conversion keeps
    /// going without an audience.
    pub fn report(&mut self, progress: Progress) {
        debug_assert!(
            progress.current > self.last && progress.current <= progress.total,
            "progress must be strictly increasing and bounded: {progress:?} after {}",
            self.last
        );
        self.last = progress.current;
        debug!("Progress {}/{}", progress.current, progress.total);
        if let Some(tx) = &self.tx {
            if tx.send(progress).is_err() {
                self.tx = None;
            }
        }
    }

    /// Last page number reported, 0 before the first event.
    pub fn last_reported(&self) -> usize {
        self.last
    }
}
