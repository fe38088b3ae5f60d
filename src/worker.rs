//! The background execution context.
//!
//! A worker is a single-threaded event loop that owns the output
//! accumulator for as long as it is alive. The interactive side holds a
//! [`WorkerHandle`] and talks to it only through [`Command`]s and
//! [`Event`]s; nothing mutable is shared except the cancellation flag.
//!
//! [`ThreadSpawner`] hosts the loop on a dedicated OS thread running a
//! current-thread tokio runtime. Any failure to create that context is
//! reported as [`ShrinkError::BackgroundContextUnavailable`], which makes
//! topology selection fall back instead of failing the session.

use crate::cancel::CancellationToken;
use crate::config::{ConversionOptions, Limits};
use crate::engines::Engines;
use crate::error::{ShrinkError, WorkerFailure};
use crate::pipeline::assemble::Accumulator;
use crate::pipeline::encode::EncodedPage;
use crate::pipeline::orchestrator::{convert_in_context, Assembled, Job, PageSink};
use crate::protocol::{Command, Event};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Creates background execution contexts.
pub trait ContextSpawner: Send + Sync {
    /// Start a worker serving `engines`, or fail with
    /// [`ShrinkError::BackgroundContextUnavailable`].
    fn spawn(&self, engines: &Engines) -> Result<WorkerHandle, ShrinkError>;
}

// ── Interactive side ─────────────────────────────────────────────────────

/// Interactive-side end of a worker's channels.
#[derive(Debug)]
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<Event>,
    retired: bool,
}

/// Background-side end of a worker's channels.
#[derive(Debug)]
pub struct WorkerEndpoint {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub events: mpsc::UnboundedSender<Event>,
}

impl WorkerHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<Command>,
        events: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self {
            commands,
            events,
            retired: false,
        }
    }

    /// A connected handle/endpoint pair.
    pub fn channel() -> (WorkerHandle, WorkerEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            WorkerHandle::new(command_tx, event_rx),
            WorkerEndpoint {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    pub fn send(&self, command: Command) -> Result<(), ShrinkError> {
        let name = command.name();
        self.commands
            .send(command)
            .map_err(|_| ShrinkError::processing(format!("background worker stopped before '{name}'")))?;
        debug!("→ worker: {}", name);
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Event, ShrinkError> {
        let event = self
            .events
            .recv()
            .await
            .ok_or_else(|| ShrinkError::processing("background worker stopped unexpectedly"))?;
        debug!("← worker: {}", event.name());
        Ok(event)
    }

    /// [`recv`](Self::recv) bounded by `timeout`.
    pub async fn recv_within(&mut self, timeout: Duration) -> Result<Event, ShrinkError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| ShrinkError::WorkerTimeout {
                secs: timeout.as_secs(),
            })?
    }

    /// Discard events left over from an earlier conversion.
    pub fn drain_stale(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(event) = self.events.try_recv() {
            debug!("Dropping stale worker event '{}'", event.name());
            dropped += 1;
        }
        dropped
    }

    /// Mark the worker as unusable for further conversions. Its late
    /// events could otherwise be read as answers to the next conversion.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    /// `false` once the worker loop has exited or the handle was retired.
    pub fn is_alive(&self) -> bool {
        !self.retired && !self.commands.is_closed()
    }
}

/// [`PageSink`] that hands each page to a background accumulator.
///
/// Sends `addPage` and waits for `pageAdded` before returning, so the next
/// page is not rendered until the previous one has been appended.
pub struct RemoteSink<'w> {
    worker: &'w mut WorkerHandle,
    ack_timeout: Duration,
    settled: bool,
}

impl<'w> RemoteSink<'w> {
    pub fn new(worker: &'w mut WorkerHandle, ack_timeout: Duration) -> Self {
        Self {
            worker,
            ack_timeout,
            settled: false,
        }
    }

    /// `true` once the worker has already ended this conversion with
    /// `aborted` or `error`.
    pub fn settled(&self) -> bool {
        self.settled
    }
}

impl PageSink for RemoteSink<'_> {
    async fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError> {
        let index = page.index();
        self.worker.send(Command::AddPage { page, scale })?;
        loop {
            match self.worker.recv_within(self.ack_timeout).await? {
                Event::PageAdded => return Ok(()),
                Event::Aborted => {
                    self.settled = true;
                    return Err(ShrinkError::AbortedByUser);
                }
                Event::Error(failure) => {
                    self.settled = true;
                    return Err(failure.into());
                }
                other => debug!(
                    "Ignoring '{}' while waiting for page {} acknowledgment",
                    other.name(),
                    index + 1
                ),
            }
        }
    }
}

// ── Background side ──────────────────────────────────────────────────────

/// Spawns each worker on its own named OS thread.
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    thread_name: String,
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self {
            thread_name: "pdfshrink-worker".to_string(),
        }
    }
}

impl ThreadSpawner {
    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl ContextSpawner for ThreadSpawner {
    fn spawn(&self, engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ShrinkError::BackgroundContextUnavailable {
                reason: format!("cannot build worker runtime: {e}"),
            })?;

        let (handle, endpoint) = WorkerHandle::channel();
        let engines = engines.clone();
        std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                runtime.block_on(serve(engines, endpoint));
                debug!("Background worker exited");
            })
            .map_err(|e| ShrinkError::BackgroundContextUnavailable {
                reason: format!("cannot spawn worker thread: {e}"),
            })?;

        info!("Started background worker '{}'", self.thread_name);
        Ok(handle)
    }
}

enum Phase {
    /// No conversion in progress.
    Idle,
    /// Hybrid conversion: pages are being appended.
    Building(Box<dyn Accumulator>),
    /// The current conversion already ended with `aborted` or `error`;
    /// its remaining commands are ignored.
    Settled,
}

struct Worker {
    engines: Engines,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    phase: Phase,
}

/// Run the worker loop until the interactive side drops its handle.
///
/// The future is not `Send`: the renderer is bound inside it. Drive it with
/// `block_on` on the thread that owns it.
pub async fn serve(engines: Engines, endpoint: WorkerEndpoint) {
    let WorkerEndpoint {
        mut commands,
        events,
    } = endpoint;
    let mut worker = Worker {
        engines,
        events,
        cancel: CancellationToken::new(),
        phase: Phase::Idle,
    };
    while let Some(command) = commands.recv().await {
        worker.handle(command).await;
    }
}

impl Worker {
    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Interactive side is gone; dropping event");
        }
    }

    fn fail(&mut self, err: &ShrinkError) {
        self.phase = Phase::Settled;
        if err.is_user_abort() {
            self.emit(Event::Aborted);
        } else {
            warn!("Background conversion failed: {}", err);
            self.emit(Event::Error(WorkerFailure::from(err)));
        }
    }

    async fn handle(&mut self, command: Command) {
        debug!("worker ← {}", command.name());
        match command {
            Command::Start {
                bytes,
                options,
                limits,
                cancel,
            } => {
                self.cancel = cancel;
                self.phase = Phase::Idle;
                if let Err(e) = self.cancel.check() {
                    return self.fail(&e);
                }
                match self.run(&bytes, options, limits).await {
                    Ok(Assembled { bytes, page_count }) => {
                        self.emit(Event::Done { bytes, page_count })
                    }
                    Err(e) => self.fail(&e),
                }
            }

            Command::Init { cancel } => {
                self.cancel = cancel;
                self.phase = Phase::Idle;
                if let Err(e) = self.cancel.check() {
                    return self.fail(&e);
                }
                match self.engines.builder.begin() {
                    Ok(accumulator) => self.phase = Phase::Building(accumulator),
                    Err(e) => self.fail(&e),
                }
            }

            Command::AddPage { page, scale } => {
                if matches!(self.phase, Phase::Settled) {
                    debug!("Ignoring addPage for a settled conversion");
                    return;
                }
                if let Err(e) = self.cancel.check() {
                    return self.fail(&e);
                }
                let result = match &mut self.phase {
                    Phase::Building(accumulator) => accumulator.append(page, scale),
                    _ => Err(ShrinkError::Internal(
                        "addPage received before init".to_string(),
                    )),
                };
                match result {
                    Ok(()) => self.emit(Event::PageAdded),
                    Err(e) => self.fail(&e),
                }
            }

            Command::Finish => {
                if matches!(self.phase, Phase::Settled) {
                    debug!("Ignoring finish for a settled conversion");
                    return;
                }
                if let Err(e) = self.cancel.check() {
                    return self.fail(&e);
                }
                match std::mem::replace(&mut self.phase, Phase::Idle) {
                    Phase::Building(accumulator) => {
                        let page_count = accumulator.page_count();
                        match accumulator.finish() {
                            Ok(bytes) => self.emit(Event::Done { bytes, page_count }),
                            Err(e) => self.fail(&e),
                        }
                    }
                    _ => self.fail(&ShrinkError::Internal(
                        "finish received before init".to_string(),
                    )),
                }
            }

            Command::Abort => {
                if matches!(self.phase, Phase::Building(_)) {
                    info!("Discarding partial document");
                    self.fail(&ShrinkError::AbortedByUser);
                } else {
                    debug!("Ignoring abort: no document in progress");
                }
            }
        }
    }

    async fn run(
        &self,
        bytes: &[u8],
        options: ConversionOptions,
        limits: Limits,
    ) -> Result<Assembled, ShrinkError> {
        let engine = self.engines.renderer.engine()?;
        let job = Job {
            bytes,
            options,
            limits,
        };
        let events = self.events.clone();
        convert_in_context(
            engine.as_ref(),
            self.engines.encoder.as_ref(),
            self.engines.builder.as_ref(),
            &job,
            &self.cancel,
            move |progress| {
                let _ = events.send(Event::Progress(progress));
            },
        )
        .await
    }
}
