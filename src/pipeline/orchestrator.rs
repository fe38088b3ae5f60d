//! The per-page loop: render → encode → append, strictly in page order.
//!
//! [`drive_pages`] is shared by every topology. Where the appended page ends
//! up is abstracted by [`PageSink`]: [`LocalSink`] appends to an accumulator
//! owned by the current context, and [`crate::worker::RemoteSink`] ships the
//! page to a background context and waits for its acknowledgment.
//!
//! ## Ordering within one iteration
//!
//! ```text
//! check abort ─▶ progress (i, n) ─▶ render ─▶ encode ─▶ check abort ─▶ append
//! ```
//!
//! The rendered page is moved into the encoder and the encoded page is moved
//! into the sink, so neither outlives its iteration. Page `i + 1` is not
//! rendered until `append` for page `i` has returned.

use crate::cancel::CancellationToken;
use crate::config::{ConversionOptions, Limits};
use crate::error::ShrinkError;
use crate::pipeline::assemble::{Accumulator, DocumentBuilder};
use crate::pipeline::encode::{EncodedPage, PageEncoder};
use crate::pipeline::render::{PageSource, RenderEngine};
use crate::progress::Progress;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Destination for encoded pages.
///
/// Used generically by [`drive_pages`]; the returned future is not required
/// to be `Send`.
#[allow(async_fn_in_trait)]
pub trait PageSink {
    /// Append one page. Returns only once the page is owned by the
    /// accumulator, so the caller may render the next one.
    async fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError>;
}

/// Sink appending to an accumulator owned by the current context.
pub struct LocalSink {
    accumulator: Box<dyn Accumulator>,
}

impl LocalSink {
    pub fn new(accumulator: Box<dyn Accumulator>) -> Self {
        Self { accumulator }
    }

    pub fn page_count(&self) -> usize {
        self.accumulator.page_count()
    }

    /// Serialise the accumulated document.
    pub fn finish(self) -> Result<Vec<u8>, ShrinkError> {
        self.accumulator.finish()
    }
}

impl PageSink for LocalSink {
    async fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError> {
        self.accumulator.append(page, scale)
    }
}

/// One conversion's input as seen by a single execution context.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub bytes: &'a [u8],
    pub options: ConversionOptions,
    pub limits: Limits,
}

/// Serialised output plus the number of pages it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Decode `bytes` and enforce the page-count ceiling.
///
/// Fails with [`ShrinkError::PageLimitExceeded`] before any page is
/// rendered. Crossing `limits.warn_page_count` is only logged.
pub fn open_document<'e>(
    engine: &'e dyn RenderEngine,
    bytes: &[u8],
    limits: &Limits,
) -> Result<Box<dyn PageSource + 'e>, ShrinkError> {
    let source = engine.open(bytes)?;
    let pages = source.page_count();

    if pages > limits.max_page_count {
        return Err(ShrinkError::PageLimitExceeded {
            pages,
            limit: limits.max_page_count,
        });
    }
    if pages > limits.warn_page_count {
        warn!(
            "Document has {} pages (over {}); conversion may take a while",
            pages, limits.warn_page_count
        );
    }
    Ok(source)
}

/// Stream every page of `source` through `encoder` into `sink`.
///
/// `on_progress` fires exactly once per page, in increasing order, before
/// that page is rendered. Returns the number of pages appended.
///
/// # Errors
/// * [`ShrinkError::AbortedByUser`] when `cancel` is observed at the top of
///   an iteration or just before an append. Nothing is appended afterwards.
/// * Any renderer, encoder or sink failure, unchanged. Nothing is retried.
pub async fn drive_pages<S: PageSink>(
    source: &mut dyn PageSource,
    encoder: &dyn PageEncoder,
    options: &ConversionOptions,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
    sink: &mut S,
) -> Result<usize, ShrinkError> {
    let total = source.page_count();
    let start = Instant::now();

    for index in 0..total {
        cancel.check()?;
        on_progress(Progress {
            current: index + 1,
            total,
        });

        let page_start = Instant::now();
        // Runs inline, not in `spawn_blocking`: the engine behind `source`
        // is bound to this context and is not `Send`.
        let rendered = source.render_page(index, options.scale())?;
        let encoded = encoder.encode(rendered, options.quality())?;

        cancel.check()?;
        sink.append(encoded, options.scale()).await?;
        debug!(
            "Page {}/{} done in {}ms",
            index + 1,
            total,
            page_start.elapsed().as_millis()
        );

        // Let other tasks on this context (signal handlers, progress
        // consumers) run between pages.
        tokio::task::yield_now().await;
    }

    info!(
        "Processed {} pages in {}ms",
        total,
        start.elapsed().as_millis()
    );
    Ok(total)
}

/// Run a whole conversion inside the current context: open, loop, serialise.
///
/// Used by the main-thread topology and by the background worker in the
/// full-background topology. On any error the partial accumulator is dropped
/// without being serialised.
pub async fn convert_in_context(
    engine: &dyn RenderEngine,
    encoder: &dyn PageEncoder,
    builder: &dyn DocumentBuilder,
    job: &Job<'_>,
    cancel: &CancellationToken,
    on_progress: impl FnMut(Progress),
) -> Result<Assembled, ShrinkError> {
    let mut source = open_document(engine, job.bytes, &job.limits)?;
    let mut sink = LocalSink::new(builder.begin()?);

    let page_count = drive_pages(
        source.as_mut(),
        encoder,
        &job.options,
        cancel,
        on_progress,
        &mut sink,
    )
    .await?;
    drop(source);

    cancel.check()?;
    let bytes = sink.finish()?;
    Ok(Assembled { bytes, page_count })
}
