//! Run statistics: per-provider call counts, timings, forensic error logs.
//!
//! The orchestration layer only ever *writes* to a [`StatsSink`]; it never
//! reads counts back. [`RunStats`] is the sink used by the CLI: it keeps
//! success/failure counters per provider label, writes one log file per
//! failed call, and renders an end-of-run summary as JSON and as text.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Outcome of one provider call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub provider: String,
    pub success: bool,
    pub duration: Duration,
    /// Present on failure only.
    pub failure: Option<CallFailure>,
}

/// Forensic detail of a failed call.
#[derive(Debug, Clone)]
pub struct CallFailure {
    /// Redacted request description (no keys, no image bytes).
    pub request: serde_json::Value,
    pub error: String,
}

impl CallOutcome {
    pub fn success(provider: impl Into<String>, duration: Duration) -> Self {
        Self {
            provider: provider.into(),
            success: true,
            duration,
            failure: None,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        duration: Duration,
        request: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            duration,
            failure: Some(CallFailure {
                request,
                error: error.into(),
            }),
        }
    }
}

/// Write-only statistics sink.
///
/// Implementations must be `Send + Sync`; all methods except
/// [`StatsSink::record_call`] default to no-ops.
pub trait StatsSink: Send + Sync {
    fn record_call(&self, outcome: CallOutcome);

    fn record_page(&self, duration: Duration) {
        let _ = duration;
    }

    fn record_document(&self, duration: Duration) {
        let _ = duration;
    }
}

/// Discards everything.
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record_call(&self, _outcome: CallOutcome) {}
}

/// Convenience alias for the shared sink handed to the orchestrator.
pub type SharedStats = Arc<dyn StatsSink>;

/// Success/failure counters for one provider label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelUsage {
    pub success: u64,
    pub failure: u64,
}

impl ModelUsage {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

#[derive(Debug, Default)]
struct Counters {
    usage: BTreeMap<String, ModelUsage>,
    page_times: Vec<Duration>,
    document_times: Vec<Duration>,
}

/// Aggregating sink with optional on-disk error logs and summaries.
#[derive(Debug)]
pub struct RunStats {
    started_at: DateTime<Local>,
    started: Instant,
    error_log_dir: Option<PathBuf>,
    summary_dir: Option<PathBuf>,
    counters: Mutex<Counters>,
}

/// Serialisable end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub execution_summary: ExecutionSummary,
    pub model_usage_stats: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub start_time: String,
    pub end_time: String,
    pub total_duration_seconds: f64,
    pub translated_papers: usize,
    pub translated_pages: usize,
    pub avg_time_per_paper_seconds: f64,
    pub avg_time_per_page_seconds: f64,
}

impl RunStats {
    /// In-memory only: no error logs, no summary files.
    pub fn new(labels: &[String]) -> Self {
        let mut counters = Counters::default();
        for label in labels {
            counters.usage.entry(label.clone()).or_default();
        }
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            error_log_dir: None,
            summary_dir: None,
            counters: Mutex::new(counters),
        }
    }

    /// Write error logs to `<output>/error_logs` and summaries to
    /// `<output>/summaries`.
    pub fn with_output_dir(labels: &[String], output_dir: &Path) -> std::io::Result<Self> {
        let error_log_dir = output_dir.join("error_logs");
        let summary_dir = output_dir.join("summaries");
        std::fs::create_dir_all(&error_log_dir)?;
        std::fs::create_dir_all(&summary_dir)?;
        Ok(Self {
            error_log_dir: Some(error_log_dir),
            summary_dir: Some(summary_dir),
            ..Self::new(labels)
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A panic while holding the lock leaves plain counters behind.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counters for one label (zero if never seen).
    pub fn usage(&self, label: &str) -> ModelUsage {
        self.lock().usage.get(label).copied().unwrap_or_default()
    }

    pub fn summary(&self) -> RunSummary {
        let c = self.lock();
        let pages = c.page_times.len();
        let papers = c.document_times.len();
        let avg = |v: &[Duration]| {
            if v.is_empty() {
                0.0
            } else {
                v.iter().map(Duration::as_secs_f64).sum::<f64>() / v.len() as f64
            }
        };
        RunSummary {
            execution_summary: ExecutionSummary {
                start_time: self.started_at.to_rfc3339(),
                end_time: Local::now().to_rfc3339(),
                total_duration_seconds: self.started.elapsed().as_secs_f64(),
                translated_papers: papers,
                translated_pages: pages,
                avg_time_per_paper_seconds: avg(&c.document_times),
                avg_time_per_page_seconds: avg(&c.page_times),
            },
            model_usage_stats: c.usage.clone(),
        }
    }

    /// Write the summary as pretty JSON; returns its path, or `None` for an
    /// in-memory collector.
    pub fn save_summary(&self) -> std::io::Result<Option<PathBuf>> {
        let Some(ref dir) = self.summary_dir else {
            return Ok(None);
        };
        let path = dir.join(format!(
            "summary_{}.json",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let json = serde_json::to_string_pretty(&self.summary())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(Some(path))
    }

    /// Terminal rendering of [`RunStats::summary`].
    pub fn summary_text(&self) -> String {
        let s = self.summary();
        let e = &s.execution_summary;
        let secs = e.total_duration_seconds as u64;
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);

        let mut lines = vec![
            rule.clone(),
            format!("{:^60}", "Run summary"),
            rule.clone(),
            format!("  Papers translated:     {}", e.translated_papers),
            format!("  Pages translated:      {}", e.translated_pages),
            format!(
                "  Total time:            {:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            ),
            format!("  Avg time per paper:    {:.2}s", e.avg_time_per_paper_seconds),
            format!("  Avg time per page:     {:.2}s", e.avg_time_per_page_seconds),
            thin.clone(),
            format!("{:^60}", "Model usage"),
            thin,
        ];
        for (model, usage) in &s.model_usage_stats {
            if usage.total() == 0 {
                continue;
            }
            lines.push(format!("  Model: {model}"));
            lines.push(format!("    - calls:    {}", usage.total()));
            lines.push(format!("    - success:  {}", usage.success));
            lines.push(format!("    - failure:  {}", usage.failure));
        }
        lines.push(rule);
        lines.join("\n")
    }

    fn write_error_log(&self, outcome: &CallOutcome, failure: &CallFailure) {
        let Some(ref dir) = self.error_log_dir else {
            return;
        };
        let now = Local::now();
        let safe_label: String = outcome
            .provider
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let path = dir.join(format!(
            "error_{}_{}.log",
            safe_label,
            now.format("%Y%m%d_%H%M%S_%3f")
        ));
        let request = serde_json::to_string_pretty(&failure.request)
            .unwrap_or_else(|_| failure.request.to_string());
        let banner = |title: &str| format!("{0} {1} {0}", "=".repeat(20), title);
        let content = format!(
            "Timestamp: {}\nModel: {}\nDuration: {:.2}s\n\n{}\n{}\n\n{}\n{}\n",
            now.to_rfc3339(),
            outcome.provider,
            outcome.duration.as_secs_f64(),
            banner("REQUEST"),
            request,
            banner("RESPONSE / ERROR"),
            failure.error,
        );
        if let Err(e) = std::fs::write(&path, content) {
            warn!("Failed to write error log {}: {}", path.display(), e);
        }
    }
}

impl StatsSink for RunStats {
    fn record_call(&self, outcome: CallOutcome) {
        {
            let mut c = self.lock();
            let usage = c.usage.entry(outcome.provider.clone()).or_default();
            if outcome.success {
                usage.success += 1;
            } else {
                usage.failure += 1;
            }
        }
        if let Some(ref failure) = outcome.failure {
            self.write_error_log(&outcome, failure);
        }
    }

    fn record_page(&self, duration: Duration) {
        self.lock().page_times.push(duration);
    }

    fn record_document(&self, duration: Duration) {
        self.lock().document_times.push(duration);
    }
}
