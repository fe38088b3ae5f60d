//! Output assembly: append JPEG pages to a fresh PDF and serialise it.
//!
//! [`DocumentBuilder`] is the capability ("start a new output document");
//! [`Accumulator`] is the in-progress document it hands out. An accumulator
//! is owned by exactly one execution context, receives pages in strictly
//! increasing index order, and is consumed by [`Accumulator::finish`], so it
//! can never be serialised while an append is in flight or reused afterwards.
//!
//! The lopdf backend writes each page as a single DCTDecode image XObject
//! drawn at the origin and stretched over the whole MediaBox. JPEG streams
//! are stored as-is; re-deflating them would only cost CPU.

use crate::error::ShrinkError;
use crate::pipeline::encode::EncodedPage;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

/// The document-assembly capability.
pub trait DocumentBuilder: Send + Sync {
    /// Start an empty output document.
    fn begin(&self) -> Result<Box<dyn Accumulator>, ShrinkError>;
}

/// An output document being built page by page.
pub trait Accumulator: Send {
    /// Append `page` as a new last page sized `pixel / scale` points.
    fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError>;

    fn page_count(&self) -> usize;

    /// Serialise to PDF bytes, consuming the accumulator.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShrinkError>;
}

/// [`DocumentBuilder`] backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBuilder;

impl DocumentBuilder for LopdfBuilder {
    fn begin(&self) -> Result<Box<dyn Accumulator>, ShrinkError> {
        Ok(Box::new(LopdfAccumulator::new()))
    }
}

/// In-progress lopdf document.
pub struct LopdfAccumulator {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    next_index: usize,
}

impl LopdfAccumulator {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            next_index: 0,
        }
    }
}

impl Default for LopdfAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for LopdfAccumulator {
    fn append(&mut self, page: EncodedPage, scale: f32) -> Result<(), ShrinkError> {
        if page.index() != self.next_index {
            return Err(ShrinkError::Internal(format!(
                "page {} appended out of order (expected page {})",
                page.index() + 1,
                self.next_index + 1
            )));
        }
        if page.pixel_width() == 0 || page.pixel_height() == 0 {
            return Err(ShrinkError::processing(format!(
                "page {} rendered to an empty image",
                page.index() + 1
            )));
        }

        let (width, height) = page.page_size(scale);
        let (px_w, px_h) = (page.pixel_width(), page.pixel_height());
        let index = page.index();

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => px_w as i64,
                    "Height" => px_h as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                page.into_bytes(),
            )
            .with_compression(false),
        );

        let content = format!("q {width} 0 0 {height} 0 0 cm /Im0 Do Q").into_bytes();
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        self.kids.push(Object::Reference(page_id));
        self.next_index += 1;

        debug!(
            "Appended page {} ({:.1} x {:.1} pt)",
            index + 1,
            width,
            height
        );
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShrinkError> {
        let LopdfAccumulator {
            mut doc,
            pages_id,
            kids,
            ..
        } = *self;
        let count = kids.len();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ShrinkError::processing(format!("failed to serialise PDF: {e}")))?;
        info!("Serialised {} pages → {} bytes", count, bytes.len());
        Ok(bytes)
    }
}
