//! CLI binary for pdftrans.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranslatorConfig`, runs the batch and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdftrans::config::{
    DASHSCOPE_API_URL, DEFAULT_PROBE_URL, GEMINI_API_URL, MODEL_ALIYUN_QWEN, MODEL_GEMINI_FLASH,
    MODEL_GEMINI_PRO, MODEL_SILICONFLOW_QWEN, SILICONFLOW_API_URL,
};
use pdftrans::{
    preflight, translate_directory, GateSettings, NoopProgressCallback, ProviderChain,
    ProviderKind, ProviderSpec, RetrySettings, RunStats, TranslationProgressCallback,
    TranslatorConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// One bar per document, re-styled as documents start.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    documents_total: AtomicUsize,
    documents_seen: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning data directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            documents_total: AtomicUsize::new(0),
            documents_seen: AtomicUsize::new(0),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.documents_total.store(total_documents, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Translating {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, document: &str, total_pages: usize, resume_from: usize) {
        let n = self.documents_seen.fetch_add(1, Ordering::SeqCst) + 1;
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(resume_from as u64);
        self.bar.set_prefix(format!(
            "{}/{}",
            n,
            self.documents_total.load(Ordering::SeqCst)
        ));
        self.bar.reset_eta();
        self.bar.println(format!("{} {}", cyan("▸"), bold(document)));
        if resume_from > 0 {
            self.bar.println(format!(
                "  {} resuming at page {}",
                dim("↻"),
                resume_from + 1
            ));
        }
    }

    fn on_page_start(&self, _document: &str, page_num: usize, _total_pages: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, _document: &str, page_num: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}  {:<8}  {}",
            green("✓"),
            page_num,
            dim(&format!("{text_len:>5} bytes")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, _document: &str, page_num: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page_num,
            red(&msg),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, document: &str, total_pages: usize, failed_pages: usize) {
        if failed_pages == 0 {
            self.bar
                .println(format!("{} {} ({} pages)", green("✔"), document, total_pages));
        } else {
            self.bar.println(format!(
                "{} {} ({} pages, {} failed)",
                cyan("⚠"),
                document,
                total_pages,
                red(&failed_pages.to_string())
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate every PDF in ./Data into ./Trans
  pdftrans

  # Custom directories, 200 DPI
  pdftrans --data-dir papers --trans-dir translations --dpi 200

  # Append an extra fallback tier from edgequake-llm
  pdftrans --extra-fallback openai:gpt-4.1-mini

  # No Gemini access at all: skip the probe and the primary tier
  GOOGLE_API_KEY= pdftrans --no-preflight

PROVIDER CHAIN:
  Tier        Provider              Model (default)        Key
  ──────────  ────────────────────  ─────────────────────  ─────────────────
  primary     Google Gemini         gemini-2.5-pro         GOOGLE_API_KEY
  primary     Google Gemini         gemini-2.5-flash       GOOGLE_API_KEY
  fallback 1  Aliyun DashScope      qwen-vl-max            DASHSCOPE_API_KEY
  fallback 2  SiliconFlow           Qwen/QVQ-72B-Preview   QWEN_API_KEY
  fallback n  --extra-fallback      provider:model         provider's own env

  Primary variants get one attempt each, behind a connectivity probe.
  Fallback tiers are retried; the first one that succeeds is used for the
  rest of the run.

RESUMING:
  Progress is saved to output/<paper>/progress.json after every page.
  Re-running picks up at the first untranslated page. Delete the file to
  start a paper over.

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY      Gemini key (primary tier)
  DASHSCOPE_API_KEY   Aliyun DashScope key (fallback 1)
  QWEN_API_KEY        SiliconFlow key (fallback 2)
  PDFIUM_LIB_PATH     Path to libpdfium, if not on the loader path
  RUST_LOG            Override log filter (e.g. pdftrans=debug)
"#;

/// Translate academic PDF papers page by page with vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdftrans",
    version,
    about = "Translate academic PDF papers page by page with vision LLMs",
    long_about = "Translate every PDF in the data directory into Simplified Chinese Markdown. \
Pages are rendered to images and translated in order by Gemini, falling back to Qwen-VL tiers \
when Gemini is unreachable or failing. Progress is saved after every page.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory scanned for *.pdf files.
    #[arg(long, env = "PDFTRANS_DATA_DIR", default_value = "Data")]
    data_dir: PathBuf,

    /// Working directory (page images, progress, error logs, summaries).
    #[arg(long, env = "PDFTRANS_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory receiving the merged translations.
    #[arg(long, env = "PDFTRANS_TRANS_DIR", default_value = "Trans")]
    trans_dir: PathBuf,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDFTRANS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Google Gemini API key (primary tier).
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Aliyun DashScope API key (first fallback tier).
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    dashscope_api_key: Option<String>,

    /// SiliconFlow API key (second fallback tier).
    #[arg(long, env = "QWEN_API_KEY", hide_env_values = true)]
    qwen_api_key: Option<String>,

    /// Primary-tier Gemini models, tried once each in order.
    #[arg(long = "primary-model", env = "PDFTRANS_PRIMARY_MODELS", value_delimiter = ',',
          default_values = [MODEL_GEMINI_PRO, MODEL_GEMINI_FLASH])]
    primary_models: Vec<String>,

    /// Gemini REST base URL.
    #[arg(long, env = "PDFTRANS_GEMINI_BASE_URL", default_value = GEMINI_API_URL)]
    gemini_base_url: String,

    /// Model for the Aliyun DashScope tier.
    #[arg(long, env = "PDFTRANS_ALIYUN_MODEL", default_value = MODEL_ALIYUN_QWEN)]
    aliyun_model: String,

    /// OpenAI-compatible base URL of the Aliyun tier.
    #[arg(long, env = "PDFTRANS_DASHSCOPE_BASE_URL", default_value = DASHSCOPE_API_URL)]
    dashscope_base_url: String,

    /// Model for the SiliconFlow tier.
    #[arg(long, env = "PDFTRANS_SILICONFLOW_MODEL", default_value = MODEL_SILICONFLOW_QWEN)]
    siliconflow_model: String,

    /// OpenAI-compatible base URL of the SiliconFlow tier.
    #[arg(long, env = "PDFTRANS_SILICONFLOW_BASE_URL", default_value = SILICONFLOW_API_URL)]
    siliconflow_base_url: String,

    /// Extra fallback tier as provider:model (repeatable), e.g. openai:gpt-4.1-mini.
    #[arg(long = "extra-fallback", env = "PDFTRANS_EXTRA_FALLBACKS", value_delimiter = ',')]
    extra_fallbacks: Vec<String>,

    /// Attempts per fallback tier.
    #[arg(long, env = "PDFTRANS_MAX_RETRIES", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Seconds between fallback attempts.
    #[arg(long, env = "PDFTRANS_RETRY_DELAY", default_value_t = 5)]
    retry_delay: u64,

    /// URL probed before each primary attempt.
    #[arg(long, env = "PDFTRANS_PROBE_URL", default_value = DEFAULT_PROBE_URL)]
    probe_url: String,

    /// Probes before giving up on a network that has never answered.
    #[arg(long, env = "PDFTRANS_PROBE_RETRIES", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    probe_retries: u32,

    /// Seconds between those probes.
    #[arg(long, env = "PDFTRANS_PROBE_DELAY", default_value_t = 5)]
    probe_delay: u64,

    /// Stop waiting for a lost network after this many reconnection probes
    /// (default: wait forever).
    #[arg(long, env = "PDFTRANS_MAX_RECONNECT")]
    max_reconnect: Option<u32>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDFTRANS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to a custom per-page template ({page_num}, {context_instruction}).
    #[arg(long, env = "PDFTRANS_USER_TEMPLATE")]
    user_template: Option<PathBuf>,

    /// Trailing sentences of the previous page passed as context.
    #[arg(long, env = "PDFTRANS_CONTEXT_SENTENCES", default_value_t = 2)]
    context_sentences: usize,

    /// Max output tokens per page.
    #[arg(long, env = "PDFTRANS_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDFTRANS_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "PDFTRANS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Skip the API key and network checks before the run.
    #[arg(long, env = "PDFTRANS_NO_PREFLIGHT")]
    no_preflight: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTRANS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTRANS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTRANS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;

    // ── Preflight ────────────────────────────────────────────────────────
    if !cli.no_preflight {
        let report = preflight(&config).await;
        if !cli.quiet {
            let mark = |ok: bool| if ok { green("✓") } else { red("✗") };
            eprintln!(
                "{} Primary API key {}",
                mark(report.primary_key_configured),
                if report.primary_key_configured {
                    "configured"
                } else {
                    "missing"
                }
            );
            eprintln!(
                "{} {} {}",
                mark(report.probe.is_reachable()),
                report.probe_url,
                dim(&format!("{:?}", report.probe))
            );
            if !report.all_passed() {
                eprintln!(
                    "{} continuing with fallback tiers where needed",
                    cyan("⚠")
                );
            }
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let labels = config.provider_chain().labels();
    let stats = Arc::new(
        RunStats::with_output_dir(&labels, &config.output_dir)
            .with_context(|| format!("Failed to prepare {}", config.output_dir.display()))?,
    );

    let cli_cb = show_progress.then(CliProgressCallback::new);
    let callback: &dyn TranslationProgressCallback = match cli_cb {
        Some(ref cb) => &**cb,
        None => &NoopProgressCallback,
    };

    let report = translate_directory(&config, callback, stats.clone())
        .await
        .context("Translation run failed")?;

    if let Some(cb) = cli_cb {
        cb.bar.finish_and_clear();
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if report.documents.is_empty() && !cli.quiet {
        eprintln!(
            "{} No PDF files found in {}",
            cyan("⚠"),
            config.data_dir.display()
        );
    }
    for doc in &report.documents {
        match (&doc.output, &doc.error) {
            (Some(path), _) => eprintln!(
                "{} {}  →  {}",
                if doc.failed == 0 { green("✔") } else { cyan("⚠") },
                doc.name,
                bold(&path.display().to_string())
            ),
            (None, Some(e)) => eprintln!("{} {}  {}", red("✘"), doc.name, red(e)),
            (None, None) => {}
        }
    }

    if !cli.quiet {
        eprintln!("{}", stats.summary_text());
    }
    match stats.save_summary() {
        Ok(Some(path)) if !cli.quiet => eprintln!("{}", dim(&format!("Summary saved to {}", path.display()))),
        Ok(_) => {}
        Err(e) => eprintln!("{} Failed to save run summary: {}", red("✗"), e),
    }

    Ok(())
}

/// Map CLI args to `TranslatorConfig`.
async fn build_config(cli: &Cli) -> Result<TranslatorConfig> {
    let primary = cli
        .primary_models
        .iter()
        .map(|m| ProviderSpec {
            label: m.clone(),
            kind: ProviderKind::Gemini {
                base_url: cli.gemini_base_url.clone(),
                model: m.clone(),
                api_key: cli.google_api_key.clone(),
            },
        })
        .collect();
    let mut fallbacks = vec![
        ProviderSpec::openai_compatible(
            cli.aliyun_model.clone(),
            cli.dashscope_base_url.clone(),
            cli.aliyun_model.clone(),
            cli.dashscope_api_key.clone(),
        ),
        ProviderSpec::openai_compatible(
            cli.siliconflow_model.clone(),
            cli.siliconflow_base_url.clone(),
            cli.siliconflow_model.clone(),
            cli.qwen_api_key.clone(),
        ),
    ];
    for extra in &cli.extra_fallbacks {
        fallbacks.push(ProviderSpec::parse_factory(extra)?);
    }
    let chain = ProviderChain { primary, fallbacks };

    let gate = GateSettings {
        probe_url: cli.probe_url.clone(),
        initial_retry_limit: cli.probe_retries,
        initial_retry_delay: Duration::from_secs(cli.probe_delay),
        max_reconnect_attempts: cli.max_reconnect,
        ..GateSettings::default()
    };

    let mut builder = TranslatorConfig::builder()
        .data_dir(cli.data_dir.clone())
        .output_dir(cli.output_dir.clone())
        .trans_dir(cli.trans_dir.clone())
        .dpi(cli.dpi)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .retry(RetrySettings {
            max_attempts: cli.max_retries,
            delay: Duration::from_secs(cli.retry_delay),
        })
        .gate(gate)
        .context_sentences(cli.context_sentences)
        .providers(chain);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref path) = cli.user_template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read user template from {:?}", path))?;
        builder = builder.user_prompt_template(template);
    }

    Ok(builder.build()?)
}
