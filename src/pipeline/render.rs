//! Page rasterisation: the renderer capability and its pdfium backend.
//!
//! The pipeline talks to rendering only through three traits, so the
//! orchestrator can be driven by pdfium in production and by synthetic
//! documents in tests:
//!
//! * [`RenderBackend`] is shared by every execution context and hands out
//!   engines. It also reports whether rendering may happen off the
//!   interactive context at all.
//! * [`RenderEngine`] is bound inside the context that renders. pdfium keeps
//!   per-binding state, so an engine never crosses a thread boundary.
//! * [`PageSource`] is one opened document: page count plus rasterisation.
//!
//! ## Memory
//!
//! A rendered page allocates `width × height × 4` bytes, i.e. page area ×
//! scale². [`RenderedPage`] owns that buffer and the encoder takes it *by
//! value*, so the buffer is freed before the next page is rendered. The type
//! system, not a convention, keeps at most one page of pixels alive.

use crate::error::ShrinkError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw pixels for one page. Consumed by the encoder.
pub struct RenderedPage {
    index: usize,
    image: DynamicImage,
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("index", &self.index)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl RenderedPage {
    /// `index` is 0-based.
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Give up ownership of the pixel buffer.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// An opened, decoded document that can rasterise its pages.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `scale` × its natural size.
    fn render_page(&mut self, index: usize, scale: f32) -> Result<RenderedPage, ShrinkError>;
}

/// A renderer bound in the current execution context.
pub trait RenderEngine {
    /// Decode `bytes` into a document handle.
    fn open<'a>(&'a self, bytes: &[u8]) -> Result<Box<dyn PageSource + 'a>, ShrinkError>;
}

/// The page-rasterisation capability, shareable across contexts.
pub trait RenderBackend: Send + Sync {
    /// Bind an engine in the calling context.
    fn engine(&self) -> Result<Box<dyn RenderEngine>, ShrinkError>;

    /// Whether rendering can happen inside a background context, i.e. it
    /// does not need a surface owned by the interactive context.
    fn supports_background(&self) -> bool {
        true
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`RenderBackend`] that binds pdfium on demand.
///
/// `library_path` overrides discovery; otherwise binding tries, in order,
/// `PDFIUM_LIB_PATH`, the platform library name in the working directory,
/// then the system library search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

impl RenderBackend for PdfiumBackend {
    fn engine(&self) -> Result<Box<dyn RenderEngine>, ShrinkError> {
        let engine = match &self.library_path {
            Some(path) => PdfiumEngine::bind_to(path)?,
            None => PdfiumEngine::bind()?,
        };
        Ok(Box::new(engine))
    }
}

/// [`RenderEngine`] backed by a pdfium binding.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl PdfiumEngine {
    /// Bind using the discovery order documented on [`PdfiumBackend`].
    pub fn bind() -> Result<Self, ShrinkError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ShrinkError::PdfiumBindingFailed(format!("{e:?}")))?;

        debug!("Bound pdfium library");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Bind to the library at `path`.
    pub fn bind_to(path: &Path) -> Result<Self, ShrinkError> {
        let bindings = Pdfium::bind_to_library(path).map_err(|e| {
            ShrinkError::PdfiumBindingFailed(format!("{}: {e:?}", path.display()))
        })?;
        debug!("Bound pdfium library at {}", path.display());
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl RenderEngine for PdfiumEngine {
    fn open<'a>(&'a self, bytes: &[u8]) -> Result<Box<dyn PageSource + 'a>, ShrinkError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), None)
            .map_err(|e| {
                let detail = format!("{e:?}");
                if detail.contains("Password") || detail.contains("password") {
                    ShrinkError::processing("PDF is encrypted and requires a password")
                } else {
                    ShrinkError::processing(format!("cannot open PDF: {detail}"))
                }
            })?;
        info!("PDF loaded: {} pages", document.pages().len());
        Ok(Box::new(PdfiumSource { document }))
    }
}

struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&mut self, index: usize, scale: f32) -> Result<RenderedPage, ShrinkError> {
        let page = self
            .document
            .pages()
            .get(pdfium_page_index(index)?)
            .map_err(|e| ShrinkError::processing(format!("page {}: {e:?}", index + 1)))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ShrinkError::processing(format!("rasterisation failed for page {}: {e:?}", index + 1))
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(RenderedPage::new(index, image))
    }
}

/// pdfium addresses pages with a `u16`.
fn pdfium_page_index(index: usize) -> Result<u16, ShrinkError> {
    u16::try_from(index).map_err(|_| {
        ShrinkError::processing(format!(
            "page {} is beyond the {} pages pdfium can address",
            index + 1,
            u16::MAX as usize + 1
        ))
    })
}
