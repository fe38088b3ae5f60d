//! A conversion session: one topology, many sequential conversions.
//!
//! ```rust,no_run
//! use edgequake_pdfshrink::{progress, CancellationToken, ConversionConfig, ConversionOptions,
//!     Engines, InputFile, Outcome, Session};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(Engines::pdfium(), ConversionConfig::default());
//! let input = InputFile::from_path("scan.pdf").await?;
//! let (reporter, _events) = progress::channel();
//!
//! match session
//!     .convert(&input, &ConversionOptions::default(), &CancellationToken::new(), reporter)
//!     .await
//! {
//!     Outcome::Done(pdf) => pdf.write_to(pdf.file_name()).await?,
//!     Outcome::Aborted => {}
//!     Outcome::Failed(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The future returned by [`Session::convert`] is not `Send`: in the
//! main-thread and hybrid topologies the renderer is bound in, and used
//! from, the calling task. Await it directly rather than spawning it.

use crate::cancel::CancellationToken;
use crate::config::{ConversionConfig, ConversionOptions};
use crate::engines::Engines;
use crate::error::ShrinkError;
use crate::output::{OutputArtifact, Outcome};
use crate::pipeline::input::{check_input, InputFile};
use crate::pipeline::orchestrator::Job;
use crate::progress::ProgressReporter;
use crate::topology::{select_topology, Strategy, Topology};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Lifecycle of the current conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Owns the selected strategy and runs conversions one at a time.
#[derive(Debug)]
pub struct Session {
    engines: Engines,
    config: ConversionConfig,
    /// `None` after the worker was discarded; re-selected on next use.
    strategy: Option<Strategy>,
    topology: Topology,
    degraded_notice: Option<String>,
    state: SessionState,
}

impl Session {
    /// Select the execution topology once for this session.
    pub fn new(engines: Engines, config: ConversionConfig) -> Self {
        let selection = select_topology(config.topology, &engines);
        Self {
            topology: selection.strategy.topology(),
            strategy: Some(selection.strategy),
            degraded_notice: selection.degraded_notice,
            engines,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// User-facing notice when background execution is unavailable.
    pub fn degraded_notice(&self) -> Option<&str> {
        self.degraded_notice.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert one file.
    ///
    /// Input validation runs first; a rejected file never reaches a
    /// renderer or a background context. `progress` is dropped when this
    /// returns, which ends its stream.
    pub async fn convert(
        &mut self,
        input: &InputFile,
        options: &ConversionOptions,
        cancel: &CancellationToken,
        mut progress: ProgressReporter,
    ) -> Outcome {
        self.state = SessionState::Idle;
        let started = Instant::now();

        let options = match check_input(input, &self.config.limits, options) {
            Ok(effective) => effective,
            Err(e) => return self.settle(Err(e)),
        };

        let strategy = self.strategy.take();
        let mut strategy = match strategy {
            Some(s) if s.worker().is_none_or(|w| w.is_alive()) => s,
            _ => self.reselect(),
        };

        self.state = SessionState::Running;
        info!(
            "Compressing {} ({} bytes) via {} topology",
            input.name(),
            input.size(),
            strategy.topology()
        );
        let job = Job {
            bytes: input.bytes(),
            options,
            limits: self.config.limits,
        };
        let result = strategy
            .run(
                &self.engines,
                &job,
                cancel,
                self.config.ack_timeout(),
                &mut progress,
            )
            .await;

        if matches!(result, Err(ShrinkError::WorkerTimeout { .. })) {
            warn!("Discarding unresponsive background worker");
            drop(strategy);
        } else {
            self.strategy = Some(strategy);
        }

        let topology = self.topology;
        self.settle(result.map(|assembled| {
            let artifact = OutputArtifact::new(
                assembled.bytes,
                input.output_file_name(),
                assembled.page_count,
                input.size(),
                topology,
                started.elapsed().as_millis() as u64,
            );
            info!(
                "Compressed {} → {} ({}% smaller, {} pages)",
                input.name(),
                artifact.file_name(),
                artifact.reduction_percent(),
                artifact.page_count()
            );
            artifact
        }))
    }

    fn reselect(&mut self) -> Strategy {
        let selection = select_topology(self.config.topology, &self.engines);
        self.topology = selection.strategy.topology();
        self.degraded_notice = selection.degraded_notice;
        selection.strategy
    }

    fn settle(&mut self, result: Result<OutputArtifact, ShrinkError>) -> Outcome {
        let (state, outcome) = match result {
            Ok(artifact) => (SessionState::Completed, Outcome::Done(artifact)),
            Err(ShrinkError::AbortedByUser) => {
                info!("Conversion aborted by user");
                (SessionState::Aborted, Outcome::Aborted)
            }
            Err(e) => {
                warn!("Conversion failed: {}", e);
                (SessionState::Failed, Outcome::Failed(e))
            }
        };
        self.state = state;
        outcome
    }
}
