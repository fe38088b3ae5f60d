//! Execution-topology selection and the per-topology conversion strategies.
//!
//! | Topology        | Render + encode | Assemble   |
//! |-----------------|-----------------|------------|
//! | full background | background      | background |
//! | hybrid          | interactive     | background |
//! | main thread     | interactive     | interactive|
//!
//! [`select_topology`] walks the candidates in that order, starting at the
//! configured preference. Full background is only a candidate when the
//! renderer can run off the interactive context. A failed spawn is logged
//! and the next candidate is tried; main thread cannot fail to "spawn", so
//! selection always succeeds.

use crate::cancel::CancellationToken;
use crate::config::TopologyPreference;
use crate::engines::Engines;
use crate::error::ShrinkError;
use crate::pipeline::orchestrator::{convert_in_context, drive_pages, open_document, Assembled, Job};
use crate::progress::ProgressReporter;
use crate::protocol::{Command, Event};
use crate::worker::{RemoteSink, WorkerHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Notice shown when no background context could be created.
pub const DEGRADED_NOTICE: &str =
    "Background processing is unavailable; converting in the foreground. \
The application may be less responsive until the conversion finishes.";

/// Assignment of pipeline stages to execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    FullBackground,
    Hybrid,
    MainThread,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Topology::FullBackground => "full-background",
            Topology::Hybrid => "hybrid",
            Topology::MainThread => "main-thread",
        })
    }
}

/// Topologies to try, best first, for a preference and renderer capability.
pub fn candidates(preference: TopologyPreference, renders_in_background: bool) -> Vec<Topology> {
    let full = if renders_in_background {
        vec![Topology::FullBackground]
    } else {
        Vec::new()
    };
    match preference {
        TopologyPreference::Auto | TopologyPreference::FullBackground => full
            .into_iter()
            .chain([Topology::Hybrid, Topology::MainThread])
            .collect(),
        TopologyPreference::Hybrid => vec![Topology::Hybrid, Topology::MainThread],
        TopologyPreference::MainThread => vec![Topology::MainThread],
    }
}

/// The chosen way of running conversions.
#[derive(Debug)]
pub enum Strategy {
    FullBackground(WorkerHandle),
    Hybrid(WorkerHandle),
    MainThread,
}

/// Result of [`select_topology`].
#[derive(Debug)]
pub struct Selection {
    pub strategy: Strategy,
    /// Set when selection fell all the way back to the main thread although
    /// a background topology was wanted.
    pub degraded_notice: Option<String>,
}

/// Probe capabilities and create the best available strategy.
pub fn select_topology(preference: TopologyPreference, engines: &Engines) -> Selection {
    if preference == TopologyPreference::FullBackground && !engines.renderer.supports_background() {
        warn!("Renderer needs the interactive context; full background topology unavailable");
    }

    for topology in candidates(preference, engines.renderer.supports_background()) {
        let strategy = match topology {
            Topology::MainThread => Strategy::MainThread,
            background => match engines.spawner.spawn(engines) {
                Ok(worker) if background == Topology::FullBackground => {
                    Strategy::FullBackground(worker)
                }
                Ok(worker) => Strategy::Hybrid(worker),
                Err(e) => {
                    warn!("{} topology unavailable: {}", background, e);
                    continue;
                }
            },
        };

        let degraded_notice = (topology == Topology::MainThread
            && preference != TopologyPreference::MainThread)
            .then(|| DEGRADED_NOTICE.to_string());
        info!("Selected {} topology", topology);
        return Selection {
            strategy,
            degraded_notice,
        };
    }

    // `candidates` always ends with MainThread.
    Selection {
        strategy: Strategy::MainThread,
        degraded_notice: Some(DEGRADED_NOTICE.to_string()),
    }
}

impl Strategy {
    pub fn topology(&self) -> Topology {
        match self {
            Strategy::FullBackground(_) => Topology::FullBackground,
            Strategy::Hybrid(_) => Topology::Hybrid,
            Strategy::MainThread => Topology::MainThread,
        }
    }

    /// The worker behind a background strategy.
    pub fn worker(&self) -> Option<&WorkerHandle> {
        match self {
            Strategy::FullBackground(w) | Strategy::Hybrid(w) => Some(w),
            Strategy::MainThread => None,
        }
    }

    /// Run one validated conversion.
    pub async fn run(
        &mut self,
        engines: &Engines,
        job: &Job<'_>,
        cancel: &CancellationToken,
        ack_timeout: Duration,
        progress: &mut ProgressReporter,
    ) -> Result<Assembled, ShrinkError> {
        match self {
            Strategy::MainThread => run_main_thread(engines, job, cancel, progress).await,
            Strategy::Hybrid(worker) => {
                worker.drain_stale();
                run_hybrid(worker, engines, job, cancel, ack_timeout, progress).await
            }
            Strategy::FullBackground(worker) => {
                worker.drain_stale();
                run_full_background(worker, job, cancel, progress).await
            }
        }
    }
}

async fn run_main_thread(
    engines: &Engines,
    job: &Job<'_>,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<Assembled, ShrinkError> {
    let engine = engines.renderer.engine()?;
    convert_in_context(
        engine.as_ref(),
        engines.encoder.as_ref(),
        engines.builder.as_ref(),
        job,
        cancel,
        |p| progress.report(p),
    )
    .await
}

/// Render here, assemble in the worker, one page in flight at a time.
async fn run_hybrid(
    worker: &mut WorkerHandle,
    engines: &Engines,
    job: &Job<'_>,
    cancel: &CancellationToken,
    ack_timeout: Duration,
    progress: &mut ProgressReporter,
) -> Result<Assembled, ShrinkError> {
    let engine = engines.renderer.engine()?;
    let mut source = open_document(engine.as_ref(), job.bytes, &job.limits)?;

    worker.send(Command::Init {
        cancel: cancel.clone(),
    })?;

    let mut sink = RemoteSink::new(worker, ack_timeout);
    let driven = drive_pages(
        source.as_mut(),
        engines.encoder.as_ref(),
        &job.options,
        cancel,
        |p| progress.report(p),
        &mut sink,
    )
    .await
    .and_then(|pages| cancel.check().map(|()| pages));
    let settled = sink.settled();
    drop(source);

    if let Err(e) = driven {
        if !settled && !matches!(e, ShrinkError::WorkerTimeout { .. }) {
            abort_worker(worker, ack_timeout).await;
        }
        return Err(e);
    }

    worker.send(Command::Finish)?;
    loop {
        match worker.recv().await? {
            Event::Done { bytes, page_count } => return Ok(Assembled { bytes, page_count }),
            Event::Aborted => return Err(ShrinkError::AbortedByUser),
            Event::Error(failure) => return Err(failure.into()),
            other => debug!("Ignoring '{}' while waiting for done", other.name()),
        }
    }
}

/// Tell the worker to discard its accumulator and wait until it has.
///
/// A worker that does not confirm is retired, so the session replaces it
/// before the next conversion.
async fn abort_worker(worker: &mut WorkerHandle, ack_timeout: Duration) {
    if worker.send(Command::Abort).is_err() {
        return;
    }
    loop {
        match worker.recv_within(ack_timeout).await {
            Ok(event) if event.is_terminal() => return,
            Ok(other) => debug!("Ignoring '{}' while aborting", other.name()),
            Err(e) => {
                warn!("Worker did not confirm abort, retiring it: {}", e);
                worker.retire();
                return;
            }
        }
    }
}

/// Ship the input to the worker and relay its events.
async fn run_full_background(
    worker: &mut WorkerHandle,
    job: &Job<'_>,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<Assembled, ShrinkError> {
    worker.send(Command::Start {
        bytes: job.bytes.to_vec(),
        options: job.options,
        limits: job.limits,
        cancel: cancel.clone(),
    })?;

    let mut abort_sent = false;
    loop {
        let event = tokio::select! {
            event = worker.recv() => event?,
            _ = cancel.cancelled(), if !abort_sent => {
                abort_sent = true;
                worker.send(Command::Abort)?;
                continue;
            }
        };
        match event {
            Event::Progress(p) => progress.report(p),
            Event::Done { bytes, page_count } => return Ok(Assembled { bytes, page_count }),
            Event::Aborted => return Err(ShrinkError::AbortedByUser),
            Event::Error(failure) => return Err(failure.into()),
            Event::PageAdded => debug!("Ignoring stray pageAdded"),
        }
    }
}
