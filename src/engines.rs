//! The external capabilities a session runs on.
//!
//! Rendering, encoding, assembly and background-context creation are all
//! trait objects so a [`crate::session::Session`] can run on pdfium and lopdf
//! in production and on synthetic engines in tests.

use crate::pipeline::assemble::{DocumentBuilder, LopdfBuilder};
use crate::pipeline::encode::{JpegPageEncoder, PageEncoder};
use crate::pipeline::render::{PdfiumBackend, RenderBackend};
use crate::worker::{ContextSpawner, ThreadSpawner};
use std::sync::Arc;

/// Renderer, encoder, document builder and background-context spawner.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct Engines {
    pub renderer: Arc<dyn RenderBackend>,
    pub encoder: Arc<dyn PageEncoder>,
    pub builder: Arc<dyn DocumentBuilder>,
    pub spawner: Arc<dyn ContextSpawner>,
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines")
            .field("renders_in_background", &self.renderer.supports_background())
            .finish_non_exhaustive()
    }
}

impl Engines {
    /// pdfium rendering, JPEG encoding, lopdf assembly, OS-thread worker.
    pub fn pdfium() -> Self {
        Self::with_renderer(Arc::new(PdfiumBackend::new()))
    }

    /// Default encoder, builder and spawner around a custom renderer.
    pub fn with_renderer(renderer: Arc<dyn RenderBackend>) -> Self {
        Self {
            renderer,
            encoder: Arc::new(JpegPageEncoder),
            builder: Arc::new(LopdfBuilder),
            spawner: Arc::new(ThreadSpawner::default()),
        }
    }

    pub fn encoder(mut self, encoder: Arc<dyn PageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn builder(mut self, builder: Arc<dyn DocumentBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn ContextSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}
