//! Progress-callback trait for translation events.
//!
//! Pass a `&dyn TranslationProgressCallback` to
//! [`crate::translate::translate_directory`] to drive a progress bar or a log
//! sink. Every method defaults to a no-op, so implementors
//! override only what they need.
//!
//! # Example
//!
//! ```rust
//! use pdftrans::TranslationProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailedPages(AtomicUsize);
//!
//! impl TranslationProgressCallback for FailedPages {
//!     fn on_page_error(&self, document: &str, page_num: usize, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{document} p.{page_num}: {error}");
//!     }
//! }
//! ```

/// Events fired by the document loop, in order, from a single task.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once with the number of PDFs found in the data directory.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document starts. `resume_from` is the number of pages
    /// already present in stored progress.
    fn on_document_start(&self, document: &str, total_pages: usize, resume_from: usize) {
        let _ = (document, total_pages, resume_from);
    }

    /// Called just before the orchestrator is asked for a page.
    fn on_page_start(&self, document: &str, page_num: usize, total_pages: usize) {
        let _ = (document, page_num, total_pages);
    }

    /// Called when a page is translated. `text_len` is the byte length of the
    /// cleaned translation.
    fn on_page_complete(&self, document: &str, page_num: usize, text_len: usize) {
        let _ = (document, page_num, text_len);
    }

    /// Called when every provider failed for a page and a placeholder was
    /// stored instead.
    fn on_page_error(&self, document: &str, page_num: usize, error: &str) {
        let _ = (document, page_num, error);
    }

    /// Called once after the merged file has been written (or failed to).
    fn on_document_complete(&self, document: &str, total_pages: usize, failed_pages: usize) {
        let _ = (document, total_pages, failed_pages);
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}
