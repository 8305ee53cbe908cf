//! Error types for the pdftrans library.
//!
//! Three error types map to three levels of the translation run:
//!
//! * [`TranslateError`] (**Fatal**): the run cannot start at all (no usable
//!   provider, invalid configuration, unreadable data directory). Returned as
//!   `Err(TranslateError)` from the top-level `translate_*` functions.
//!
//! * [`OrchestrationError`] (**Per page**): a provider tier used up its retry
//!   budget, or every tier failed for one page. The document loop turns the
//!   latter into a visible placeholder and moves on to the next page.
//!
//! * [`ProviderError`] (**Per call**): one request to one endpoint failed.
//!   Always absorbed by the retry policy or the fallback walk.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdftrans library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No provider in the chain could be instantiated.
    #[error("No translation provider is configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    /// A provider could not be built (bad base URL, TLS backend failure, …).
    #[error("Failed to initialise provider '{label}': {detail}")]
    ProviderInit { label: String, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The directory holding the source PDFs could not be read.
    #[error("Cannot read data directory '{path}': {source}")]
    DataDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A working directory could not be created.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// No usable libpdfium could be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium on the loader path, place it in the working directory,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not persist translation progress.
    #[error("Failed to save progress to '{path}': {source}")]
    ProgressWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write the merged Markdown file or the render manifest.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single provider call failed.
///
/// Every client normalises "empty body" and "no content field" into
/// [`ProviderError::EmptyResponse`] so callers never branch on the shape of
/// a useless answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Connection refused, DNS failure, TLS error, broken stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The HTTP client timed out waiting for the endpoint.
    #[error("request timed out")]
    Timeout,

    /// 401 / 403 from the endpoint.
    #[error("authentication rejected (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint answered but carried no translated text.
    #[error("empty response")]
    EmptyResponse,

    /// The body could not be decoded at all.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The page image could not be read.
    #[error("cannot read page image: {0}")]
    Image(String),
}

/// Tier-level failures produced by the retry policy and the orchestrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    /// A tier's bounded retry budget is used up.
    #[error("{provider} failed after {attempts} attempts: {last_cause}")]
    ExhaustedRetries {
        provider: String,
        attempts: u32,
        last_cause: ProviderError,
    },

    /// Every tier failed for this page.
    #[error("Page {page}: all providers exhausted ({last_cause})")]
    AllProvidersExhausted { page: usize, last_cause: String },
}

/// Shorten a response body for inclusion in an error message.
pub(crate) fn truncate_detail(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        body.to_string()
    } else {
        let cut: String = body.chars().take(max).collect();
        format!("{cut}\u{2026}")
    }
}
