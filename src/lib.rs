//! # pdftrans
//!
//! Translate academic PDF papers page by page with vision language models.
//!
//! ## Why page images?
//!
//! Papers are full of two-column layouts, formulae and tables that text
//! extraction scrambles. Each page is rasterised and shown to a vision model,
//! which translates what it sees into Markdown. Pages are translated in order
//! so the tail of one page can steer the start of the next.
//!
//! ## Run Overview
//!
//! ```text
//! Data/*.pdf
//!  │
//!  ├─ 1. Render   pdfium → output/<stem>/page_<n>.png (spawn_blocking)
//!  ├─ 2. Prompt   page template + last sentences of the previous page
//!  ├─ 3. Route    connectivity gate → primary variants → fallback tiers
//!  ├─ 4. Persist  output/<stem>/progress.json after every page
//!  └─ 5. Merge    Trans/translated-<stem>.md
//! ```
//!
//! Routing is the interesting part. The primary vendor (Gemini) sits behind
//! a network path that may be down; a cheap probe decides whether to try it
//! at all. When a fallback tier (Aliyun Qwen, SiliconFlow Qwen, or any
//! `edgequake-llm` provider) succeeds, the run sticks to it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftrans::{translate_directory, NoopProgressCallback, RunStats, TranslatorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys from GOOGLE_API_KEY / DASHSCOPE_API_KEY / QWEN_API_KEY
//!     let config = TranslatorConfig::default();
//!     let stats = Arc::new(RunStats::new(&config.provider_chain().labels()));
//!     let report = translate_directory(&config, &NoopProgressCallback, stats.clone()).await?;
//!     eprintln!("{} documents, {} failed pages", report.documents.len(), report.failed_pages());
//!     eprintln!("{}", stats.summary_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftrans` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod stats;
pub mod store;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    GateSettings, ProviderChain, ProviderKind, ProviderSpec, RetrySettings, TranslatorConfig,
    TranslatorConfigBuilder,
};
pub use context::PageContextBuilder;
pub use error::{OrchestrationError, ProviderError, TranslateError};
pub use gate::{ConnectivityGate, ConnectivityProbe, GateDecision, HttpProbe, ProbeOutcome};
pub use orchestrator::{FallbackOrchestrator, OrchestratorState, PageJob};
pub use pipeline::encode::PageImage;
pub use progress::{NoopProgressCallback, TranslationProgressCallback};
pub use provider::{ProviderClient, ProviderHandle, ProviderIdentity, ProviderTiers};
pub use retry::RetryPolicy;
pub use stats::{CallOutcome, NoopStats, RunStats, SharedStats, StatsSink};
pub use store::{ProgressStore, TranslationProgress};
pub use translate::{
    preflight, translate_directory, translate_document, translate_pdfs, DocumentReport,
    PreflightReport, RunReport,
};
