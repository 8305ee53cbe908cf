//! Document loop, merge and batch entry points.
//!
//! ```text
//! Data/*.pdf ──render──▶ output/<stem>/page_<n>.png
//!                              │
//!                 for each page from the resume point:
//!                   prompt ◀── PageContextBuilder(previous page)
//!                   text   ◀── FallbackOrchestrator (or placeholder)
//!                   save   ──▶ output/<stem>/progress.json
//!                              │
//!                        merge ──▶ Trans/translated-<stem>.md
//! ```
//!
//! Only configuration problems are fatal. A page that fails everywhere
//! becomes a placeholder, a PDF that cannot be rasterised is skipped, and a
//! failed merge write is reported without stopping the batch.

use crate::config::TranslatorConfig;
use crate::context::PageContextBuilder;
use crate::error::TranslateError;
use crate::gate::{ConnectivityProbe, HttpProbe, ProbeOutcome};
use crate::orchestrator::{FallbackOrchestrator, PageJob};
use crate::pipeline::encode::PageImage;
use crate::pipeline::render;
use crate::progress::TranslationProgressCallback;
use crate::prompts::error_placeholder;
use crate::stats::SharedStats;
use crate::store::{ProgressStore, TranslationProgress};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of [`translate_document`].
#[derive(Debug, Clone)]
pub struct DocumentTranslation {
    pub progress: TranslationProgress,
    /// Pages found in stored progress when the document started.
    pub resumed_from: usize,
    /// Pages translated successfully during this call.
    pub translated: usize,
    /// Pages that ended as placeholders during this call.
    pub failed: usize,
}

/// Per-document entry of a [`RunReport`].
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub name: String,
    pub total_pages: usize,
    pub resumed_from: usize,
    pub translated: usize,
    pub failed: usize,
    /// Merged Markdown file, when it was written.
    pub output: Option<PathBuf>,
    /// Why the document was skipped or its merge failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    pub fn failed_pages(&self) -> usize {
        self.documents.iter().map(|d| d.failed).sum()
    }

    pub fn documents_with_errors(&self) -> usize {
        self.documents.iter().filter(|d| d.error.is_some()).count()
    }
}

/// Translate the pages in `images` for document `key`, resuming from stored
/// progress and persisting it after every page.
pub async fn translate_document(
    orchestrator: &mut FallbackOrchestrator,
    store: &ProgressStore,
    builder: &PageContextBuilder,
    key: &str,
    images: &[PathBuf],
    callback: &dyn TranslationProgressCallback,
) -> DocumentTranslation {
    let total = images.len();
    let mut progress = store.load(key).await.unwrap_or_default();
    if progress.len() > total {
        warn!(
            "{}: stored progress has {} pages but the document has {}; truncating",
            key,
            progress.len(),
            total
        );
        progress.translated_texts.truncate(total);
        if let Err(e) = store.save(key, &progress).await {
            warn!("{}: {}", key, e);
        }
    }

    let resumed_from = progress.resume_point();
    if resumed_from == total {
        info!("{}: all {} pages already translated", key, total);
    } else if resumed_from > 0 {
        info!("{}: resuming at page {}/{}", key, resumed_from + 1, total);
    }
    callback.on_document_start(key, total, resumed_from);

    let mut translated = 0;
    let mut failed = 0;

    for (i, image_path) in images.iter().enumerate().skip(resumed_from) {
        let page_num = i + 1;
        let page_start = Instant::now();
        info!("{}: translating page {}/{}", key, page_num, total);
        callback.on_page_start(key, page_num, total);

        let prior = progress.last().map(str::to_string);
        let prompt = builder.prompt(page_num, prior.as_deref());

        let outcome = match PageImage::load(image_path).await {
            Ok(image) => {
                let job = PageJob::new(page_num, image, prior, prompt);
                orchestrator
                    .translate_page(&job)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(format!("cannot read {}: {}", image_path.display(), e)),
        };

        match outcome {
            Ok(text) => {
                callback.on_page_complete(key, page_num, text.len());
                progress.push(text);
                orchestrator.stats().record_page(page_start.elapsed());
                translated += 1;
            }
            Err(e) => {
                error!("{}: page {} failed: {}", key, page_num, e);
                callback.on_page_error(key, page_num, &e);
                progress.push(error_placeholder(page_num));
                failed += 1;
            }
        }

        if let Err(e) = store.save(key, &progress).await {
            warn!("{}: {}", key, e);
        }
    }

    DocumentTranslation {
        progress,
        resumed_from,
        translated,
        failed,
    }
}

/// Merged Markdown for one document.
pub fn assemble_document(title: &str, pages: &[String]) -> String {
    let mut out = format!("# {title}\n\n");
    for (i, text) in pages.iter().enumerate() {
        out.push_str(&format!("\n\n--- Page {} ---\n\n", i + 1));
        out.push_str(text);
    }
    out
}

/// Merged output path for document `stem`.
pub fn translation_path(trans_dir: &Path, stem: &str) -> PathBuf {
    trans_dir.join(format!("translated-{stem}.md"))
}

/// Write `content` to `path` via a temp file and rename.
pub async fn write_translation(path: &Path, content: &str) -> Result<(), TranslateError> {
    let write_err = |source| TranslateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, content).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// PDFs in `dir`, sorted by file name. The extension match ignores case.
pub fn scan_pdfs(dir: &Path) -> Result<Vec<PathBuf>, TranslateError> {
    let entries = std::fs::read_dir(dir).map_err(|source| TranslateError::DataDirUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

fn document_stem(pdf: &Path) -> String {
    pdf.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

/// Translate every PDF in `config.data_dir` with one orchestrator built from
/// `config`.
pub async fn translate_directory(
    config: &TranslatorConfig,
    callback: &dyn TranslationProgressCallback,
    stats: SharedStats,
) -> Result<RunReport, TranslateError> {
    for dir in [&config.data_dir, &config.output_dir, &config.trans_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| TranslateError::CreateDirFailed {
                path: dir.clone(),
                source,
            })?;
    }

    let pdfs = scan_pdfs(&config.data_dir)?;
    if pdfs.is_empty() {
        warn!("No PDF files found in {}", config.data_dir.display());
        return Ok(RunReport::default());
    }
    info!("Found {} PDF files in {}", pdfs.len(), config.data_dir.display());

    let mut orchestrator = FallbackOrchestrator::from_config(config, stats)?;
    Ok(translate_pdfs(config, &pdfs, &mut orchestrator, callback).await)
}

/// Batch loop over already-scanned PDFs, sharing `orchestrator` so routing
/// decisions carry over between documents.
pub async fn translate_pdfs(
    config: &TranslatorConfig,
    pdfs: &[PathBuf],
    orchestrator: &mut FallbackOrchestrator,
    callback: &dyn TranslationProgressCallback,
) -> RunReport {
    let store = ProgressStore::new(&config.output_dir);
    let builder = PageContextBuilder::from_config(config);
    let mut report = RunReport::default();
    callback.on_run_start(pdfs.len());

    for (n, pdf) in pdfs.iter().enumerate() {
        let stem = document_stem(pdf);
        info!("Processing document {}/{}: {}", n + 1, pdfs.len(), pdf.display());
        let doc_start = Instant::now();

        let images = match render::render_document(pdf, &store.document_dir(&stem), config.dpi).await {
            Ok(images) => images,
            Err(e) => {
                error!("Skipping {}: {}", pdf.display(), e);
                report.documents.push(DocumentReport {
                    name: stem,
                    total_pages: 0,
                    resumed_from: 0,
                    translated: 0,
                    failed: 0,
                    output: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let doc = translate_document(orchestrator, &store, &builder, &stem, &images, callback).await;

        let path = translation_path(&config.trans_dir, &stem);
        let merged = assemble_document(&stem, doc.progress.texts());
        let (output, merge_error) = match write_translation(&path, &merged).await {
            Ok(()) => {
                info!("Wrote {}", path.display());
                (Some(path), None)
            }
            Err(e) => {
                error!("{}", e);
                (None, Some(e.to_string()))
            }
        };

        orchestrator.stats().record_document(doc_start.elapsed());
        callback.on_document_complete(&stem, images.len(), doc.failed);
        report.documents.push(DocumentReport {
            name: stem,
            total_pages: images.len(),
            resumed_from: doc.resumed_from,
            translated: doc.translated,
            failed: doc.failed,
            output,
            error: merge_error,
        });
    }

    report
}

/// Environment checks run before a batch.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub primary_key_configured: bool,
    pub probe_url: String,
    pub probe: ProbeOutcome,
}

impl PreflightReport {
    pub fn all_passed(&self) -> bool {
        self.primary_key_configured && self.probe == ProbeOutcome::Reachable
    }
}

/// Check the primary API key and the primary network path. Never fatal:
/// the fallback tiers exist for exactly these failures.
pub async fn preflight(config: &TranslatorConfig) -> PreflightReport {
    let chain = config.provider_chain();
    let primary_key_configured = chain.primary.iter().any(|s| s.is_configured());
    if primary_key_configured {
        info!("Primary provider key configured");
    } else {
        warn!("No primary provider key configured; fallback tiers only");
    }

    let probe = HttpProbe::from_settings(&config.gate);
    let outcome = probe.probe().await;
    match &outcome {
        ProbeOutcome::Reachable => info!("{} is reachable", probe.url()),
        other => warn!("{} check failed: {:?}", probe.url(), other),
    }

    PreflightReport {
        primary_key_configured,
        probe_url: probe.url().to_string(),
        probe: outcome,
    }
}
