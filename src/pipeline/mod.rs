//! Outer collaborators of the page loop.
//!
//! ```text
//! render ──▶ encode ──▶ (orchestrator) ──▶ postprocess
//! (pdfium)   (bytes + MIME)                (cleanup)
//! ```
//!
//! 1. [`render`] rasterises a PDF into `page_<n>.png` files; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`] loads a page image for the request body
//! 3. [`postprocess`] removes formatting artefacts from each provider reply
//!    before the retry policy accepts it

pub mod encode;
pub mod postprocess;
pub mod render;
