//! Image encoding: rendered pixels → JPEG bytes.
//!
//! JPEG is where the size reduction comes from: a page of vector text and
//! embedded images becomes one lossy bitmap whose size is governed by the
//! quality factor and the render scale. Alpha is dropped (pdfium renders onto
//! an opaque white background) and pixels are stored as 8-bit RGB.

use crate::error::ShrinkError;
use crate::pipeline::render::RenderedPage;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::debug;

/// Compressed bytes for one page plus its pixel dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedPage {
    index: usize,
    jpeg: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
}

impl std::fmt::Debug for EncodedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPage")
            .field("index", &self.index)
            .field("bytes", &self.jpeg.len())
            .field("pixel_width", &self.pixel_width)
            .field("pixel_height", &self.pixel_height)
            .finish()
    }
}

impl EncodedPage {
    pub fn new(index: usize, jpeg: Vec<u8>, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            index,
            jpeg,
            pixel_width,
            pixel_height,
        }
    }

    /// 0-based page index this image came from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    /// Physical page size in points: pixel dimensions divided by the render scale.
    pub fn page_size(&self, scale: f32) -> (f32, f32) {
        (
            self.pixel_width as f32 / scale,
            self.pixel_height as f32 / scale,
        )
    }
}

/// The image-compression capability.
pub trait PageEncoder: Send + Sync {
    /// Compress `page` at `quality` in `(0, 1]`. Takes the page by value so
    /// its pixel buffer is released when encoding returns.
    fn encode(&self, page: RenderedPage, quality: f32) -> Result<EncodedPage, ShrinkError>;
}

/// Baseline JPEG encoder from the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegPageEncoder;

impl PageEncoder for JpegPageEncoder {
    fn encode(&self, page: RenderedPage, quality: f32) -> Result<EncodedPage, ShrinkError> {
        let index = page.index();
        let rgb = page.into_image().into_rgb8();
        let (width, height) = rgb.dimensions();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality(quality))
            .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| {
                ShrinkError::processing(format!("JPEG encoding failed for page {}: {e}", index + 1))
            })?;
        drop(rgb);

        debug!(
            "Encoded page {} → {} bytes JPEG ({}x{})",
            index + 1,
            jpeg.len(),
            width,
            height
        );
        Ok(EncodedPage::new(index, jpeg, width, height))
    }
}

/// Map a `(0, 1]` quality factor onto the encoder's `1..=100` scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
