//! Pipeline stages for PDF shrinking.
//!
//! Each submodule owns one step; [`orchestrator`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ assemble
//! (checks)  (pixels)   (JPEG)     (new PDF)
//! ```
//!
//! 1. [`input`]   : identify the file as a PDF and enforce size ceilings
//! 2. [`render`]  : rasterise one page at a time at the requested scale
//! 3. [`encode`]  : compress the page's pixels to JPEG at the requested quality
//! 4. [`assemble`]: append each JPEG as a full-bleed page, then serialise
//! 5. [`orchestrator`]: the page loop: ordering, progress, cancellation

pub mod assemble;
pub mod encode;
pub mod input;
pub mod orchestrator;
pub mod render;
