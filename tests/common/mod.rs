//! Synthetic engines for driving sessions without pdfium.
//!
//! A synthetic document is `%PDF-1.7` followed by `pages=N`; every page is
//! 40 × 30 points. All engines share a [`Probe`] that records the order of
//! pipeline steps and how many page buffers are alive at once.

#![allow(dead_code)]

use edgequake_pdfshrink::pipeline::assemble::{Accumulator, DocumentBuilder, LopdfBuilder};
use edgequake_pdfshrink::pipeline::encode::{EncodedPage, JpegPageEncoder, PageEncoder};
use edgequake_pdfshrink::pipeline::render::{PageSource, RenderBackend, RenderEngine, RenderedPage};
use edgequake_pdfshrink::protocol::{Command, Event};
use edgequake_pdfshrink::worker::{ContextSpawner, ThreadSpawner, WorkerHandle};
use edgequake_pdfshrink::{CancellationToken, Engines, InputFile, ShrinkError};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PAGE_WIDTH_PT: f32 = 40.0;
pub const PAGE_HEIGHT_PT: f32 = 30.0;

pub fn synthetic_pdf(pages: usize) -> Vec<u8> {
    format!("%PDF-1.7\npages={pages}\n").into_bytes()
}

pub fn synthetic_input(name: &str, pages: usize) -> InputFile {
    InputFile::from_bytes(name, synthetic_pdf(pages))
}

/// Shared observation point for all synthetic engines.
#[derive(Default)]
pub struct Probe {
    pub log: Mutex<Vec<String>>,
    pub scales: Mutex<Vec<f32>>,
    pub engines_bound: AtomicUsize,
    pub live_pixels: AtomicUsize,
    pub max_live_pixels: AtomicUsize,
    pub unappended: AtomicUsize,
    pub max_unappended: AtomicUsize,
    pub finished: AtomicUsize,
    pub spawns: AtomicUsize,
    /// Cancel this token right after rendering the given 0-based page.
    pub cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn raise(counter: &AtomicUsize, max: &AtomicUsize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────

pub struct SyntheticBackend {
    pub probe: Arc<Probe>,
    pub background: bool,
}

impl RenderBackend for SyntheticBackend {
    fn engine(&self) -> Result<Box<dyn RenderEngine>, ShrinkError> {
        self.probe.engines_bound.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticEngine {
            probe: self.probe.clone(),
        }))
    }

    fn supports_background(&self) -> bool {
        self.background
    }
}

struct SyntheticEngine {
    probe: Arc<Probe>,
}

impl RenderEngine for SyntheticEngine {
    fn open<'a>(&'a self, bytes: &[u8]) -> Result<Box<dyn PageSource + 'a>, ShrinkError> {
        let text = String::from_utf8_lossy(bytes);
        let pages = text
            .lines()
            .find_map(|l| l.strip_prefix("pages="))
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| ShrinkError::processing("cannot open PDF: no page tree"))?;
        Ok(Box::new(SyntheticDocument {
            pages,
            probe: &self.probe,
        }))
    }
}

struct SyntheticDocument<'a> {
    pages: usize,
    probe: &'a Probe,
}

impl PageSource for SyntheticDocument<'_> {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&mut self, index: usize, scale: f32) -> Result<RenderedPage, ShrinkError> {
        self.probe.push(format!("render {index}"));
        self.probe.scales.lock().unwrap().push(scale);
        Probe::raise(&self.probe.live_pixels, &self.probe.max_live_pixels);

        if let Some((at, token)) = self.probe.cancel_after.lock().unwrap().as_ref() {
            if *at == index {
                token.cancel();
            }
        }

        let w = (PAGE_WIDTH_PT * scale).round() as u32;
        let h = (PAGE_HEIGHT_PT * scale).round() as u32;
        let shade = (index * 40 % 256) as u8;
        Ok(RenderedPage::new(
            index,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([shade, 80, 160, 255]))),
        ))
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────

pub struct CountingEncoder {
    pub probe: Arc<Probe>,
}

impl PageEncoder for CountingEncoder {
    fn encode(&self, page: RenderedPage, quality: f32) -> Result<EncodedPage, ShrinkError> {
        let index = page.index();
        let encoded = JpegPageEncoder.encode(page, quality)?;
        // The pixel buffer was consumed above.
        self.probe.live_pixels.fetch_sub(1, Ordering::SeqCst);
        Probe::raise(&self.probe.unappended, &self.probe.max_unappended);
        self.probe.push(format!("encode {index}"));
        Ok(encoded)
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

pub struct CountingBuilder {
    pub probe: Arc<Probe>,
}

impl DocumentBuilder for CountingBuilder {
    fn begin(&self) -> Result<Box<dyn Accumulator>, ShrinkError> {
        Ok(Box::new(CountingAccumulator {
            inner: LopdfBuilder.begin()?,
            probe: self.probe.clone(),
        }))
    }
}

struct CountingAccumulator {
    inner: Box<dyn Accumulator>,
    probe: Arc<Probe>,
}

impl Accumulator for CountingAccumulator {
    fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError> {
        let index = page.index();
        self.inner.append(page, scale)?;
        self.probe.unappended.fetch_sub(1, Ordering::SeqCst);
        self.probe.push(format!("append {index}"));
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.inner.page_count()
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShrinkError> {
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
        self.inner.finish()
    }
}

// ── Spawners ─────────────────────────────────────────────────────────────

/// Real OS-thread worker, counting spawns.
pub struct CountingThreadSpawner {
    pub probe: Arc<Probe>,
}

impl ContextSpawner for CountingThreadSpawner {
    fn spawn(&self, engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        ThreadSpawner::named("test-worker").spawn(engines)
    }
}

/// Background context creation always fails.
pub struct FailingSpawner {
    pub probe: Arc<Probe>,
}

impl ContextSpawner for FailingSpawner {
    fn spawn(&self, _engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        Err(ShrinkError::BackgroundContextUnavailable {
            reason: "sandbox forbids threads".to_string(),
        })
    }
}

/// Fake background context on a tokio task that records every message it
/// sees or sends, and checks that no second page is queued while one is
/// being appended.
pub struct RecordingSpawner {
    pub probe: Arc<Probe>,
    pub append_delay: Duration,
}

impl ContextSpawner for RecordingSpawner {
    fn spawn(&self, _engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        let (handle, mut endpoint) = WorkerHandle::channel();
        let probe = self.probe.clone();
        let delay = self.append_delay;

        tokio::spawn(async move {
            let mut accumulator: Option<Box<dyn Accumulator>> = None;
            while let Some(command) = endpoint.commands.recv().await {
                match command {
                    Command::Init { .. } => {
                        probe.push("bg recv init");
                        accumulator = LopdfBuilder.begin().ok();
                    }
                    Command::AddPage { page, scale } => {
                        let index = page.index();
                        probe.push(format!("bg recv addPage {index}"));
                        tokio::time::sleep(delay).await;
                        if !endpoint.commands.is_empty() {
                            probe.push(format!("bg VIOLATION inbox not empty at page {index}"));
                        }
                        if let Some(acc) = accumulator.as_mut() {
                            let _ = acc.append(page, scale);
                        }
                        probe.push(format!("bg send pageAdded {index}"));
                        let _ = endpoint.events.send(Event::PageAdded);
                    }
                    Command::Finish => {
                        probe.push("bg recv finish");
                        if let Some(acc) = accumulator.take() {
                            let page_count = acc.page_count();
                            let bytes = acc.finish().unwrap_or_default();
                            let _ = endpoint.events.send(Event::Done { bytes, page_count });
                        }
                    }
                    Command::Abort => {
                        probe.push("bg recv abort");
                        if accumulator.take().is_some() {
                            let _ = endpoint.events.send(Event::Aborted);
                        }
                    }
                    Command::Start { .. } => probe.push("bg recv start"),
                }
            }
        });
        Ok(handle)
    }
}

/// Fake background context that accepts commands and never answers.
pub struct SilentSpawner {
    pub probe: Arc<Probe>,
}

impl ContextSpawner for SilentSpawner {
    fn spawn(&self, _engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        let (handle, mut endpoint) = WorkerHandle::channel();
        let probe = self.probe.clone();
        tokio::spawn(async move {
            while let Some(command) = endpoint.commands.recv().await {
                probe.push(format!("bg recv {}", command.name()));
            }
            drop(endpoint.events);
        });
        Ok(handle)
    }
}

/// Fake background context with canned replies: every `addPage` gets
/// `reply_to_add_page`, `abort` gets `reply_to_abort` (or silence), and
/// `finish` is answered with an empty `done`.
pub struct ScriptedSpawner {
    pub probe: Arc<Probe>,
    pub reply_to_add_page: Event,
    pub reply_to_abort: Option<Event>,
}

impl ContextSpawner for ScriptedSpawner {
    fn spawn(&self, _engines: &Engines) -> Result<WorkerHandle, ShrinkError> {
        self.probe.spawns.fetch_add(1, Ordering::SeqCst);
        let (handle, mut endpoint) = WorkerHandle::channel();
        let probe = self.probe.clone();
        let on_add_page = self.reply_to_add_page.clone();
        let on_abort = self.reply_to_abort.clone();

        tokio::spawn(async move {
            while let Some(command) = endpoint.commands.recv().await {
                probe.push(format!("bg recv {}", command.name()));
                let reply = match command {
                    Command::AddPage { .. } => Some(on_add_page.clone()),
                    Command::Abort => on_abort.clone(),
                    Command::Finish => Some(Event::Done {
                        bytes: Vec::new(),
                        page_count: 0,
                    }),
                    _ => None,
                };
                if let Some(event) = reply {
                    let _ = endpoint.events.send(event);
                }
            }
        });
        Ok(handle)
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────

pub fn engines(probe: &Arc<Probe>, spawner: Arc<dyn ContextSpawner>) -> Engines {
    engines_with_background(probe, spawner, true)
}

pub fn engines_with_background(
    probe: &Arc<Probe>,
    spawner: Arc<dyn ContextSpawner>,
    background: bool,
) -> Engines {
    Engines::with_renderer(Arc::new(SyntheticBackend {
        probe: probe.clone(),
        background,
    }))
    .encoder(Arc::new(CountingEncoder {
        probe: probe.clone(),
    }))
    .builder(Arc::new(CountingBuilder {
        probe: probe.clone(),
    }))
    .spawner(spawner)
}
