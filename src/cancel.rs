//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is created per conversion and passed explicitly to
//! the entry point; clones share one flag. The pipeline only *observes* the
//! flag at defined points (top of each page iteration, top of each background
//! command handler), so a render or append already in progress always runs to
//! completion.
//!
//! The flag is monotonic: once cancelled it never reads `false` again. A new
//! conversion starts with a new token.

use crate::error::ShrinkError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared, write-once abort flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Calling it again has no further effect.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(AbortedByUser)` once cancelled.
    pub fn check(&self) -> Result<(), ShrinkError> {
        if self.is_cancelled() {
            Err(ShrinkError::AbortedByUser)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
