//! Messages exchanged between the interactive and the background context.
//!
//! Commands flow interactive → background, events flow back. Both travel
//! over ordered in-process channels and carry owned data: the input bytes
//! and encoded pages are moved into the message, never shared.
//!
//! ```text
//! full background:  start ───────────────▶  progress* (done | aborted | error)
//! hybrid:           init, (addPage ▶ pageAdded)*, finish ▶ (done | error)
//!                   abort ▶ aborted        at any point before finish completes
//! ```
//!
//! In the hybrid topology `addPage` for page `i + 1` is only sent after
//! `pageAdded` for page `i` has been received, so the background inbox holds
//! at most one page image.

use crate::cancel::CancellationToken;
use crate::config::{ConversionOptions, Limits};
use crate::error::WorkerFailure;
use crate::pipeline::encode::EncodedPage;
use crate::progress::Progress;

/// Interactive → background.
#[derive(Debug)]
pub enum Command {
    /// Run the whole conversion in the background context.
    Start {
        bytes: Vec<u8>,
        options: ConversionOptions,
        limits: Limits,
        cancel: CancellationToken,
    },
    /// Create a fresh accumulator, dropping any previous one.
    Init { cancel: CancellationToken },
    /// Append one encoded page.
    AddPage { page: EncodedPage, scale: f32 },
    /// Serialise the accumulator and reply with `done`.
    Finish,
    /// Discard the accumulator. Ignored when there is none.
    Abort,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Init { .. } => "init",
            Command::AddPage { .. } => "addPage",
            Command::Finish => "finish",
            Command::Abort => "abort",
        }
    }
}

/// Background → interactive.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(Progress),
    PageAdded,
    Done { bytes: Vec<u8>, page_count: usize },
    Aborted,
    Error(WorkerFailure),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Progress(_) => "progress",
            Event::PageAdded => "pageAdded",
            Event::Done { .. } => "done",
            Event::Aborted => "aborted",
            Event::Error(_) => "error",
        }
    }

    /// `done`, `aborted` and `error` end a conversion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done { .. } | Event::Aborted | Event::Error(_))
    }
}
