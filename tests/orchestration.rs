//! Routing, retry and resume behaviour with scripted in-process providers.
//!
//! Nothing here touches the network or pdfium: providers and the
//! connectivity probe are scripted, page images are small files whose bytes
//! (`page-1`, `page-2`, …) tell a provider which page it is looking at.

use async_trait::async_trait;
use pdftrans::prompts::{error_placeholder, is_error_placeholder};
use pdftrans::{
    translate_document, ConnectivityGate, ConnectivityProbe, FallbackOrchestrator, GateSettings,
    NoopProgressCallback, OrchestrationError, PageContextBuilder, PageImage, PageJob,
    ProbeOutcome, ProgressStore, ProviderClient, ProviderError, ProviderHandle, ProviderIdentity,
    ProviderTiers, RetryPolicy, RetrySettings, RunStats, TranslationProgress,
    TranslationProgressCallback,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Test helpers ─────────────────────────────────────────────────────────────

type Script = Box<dyn Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync>;

/// Provider driven by a closure over (page tag, 0-based call number).
struct ScriptedProvider {
    script: Script,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with a translation of the page it was shown.
    fn healthy(name: &'static str) -> Arc<Self> {
        Self::new(move |page, _| Ok(format!("{name} translated {page}.")))
    }

    fn broken() -> Arc<Self> {
        Self::new(|_, _| {
            Err(ProviderError::Http {
                status: 503,
                body: "overloaded".into(),
            })
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn translate(&self, image: &PageImage, prompt: &str) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let page = String::from_utf8_lossy(image.bytes()).to_string();
        (self.script)(&page, n)
    }
}

/// Fails `failures` times, then answers.
struct ScriptedProbe {
    failures: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn probe(&self) -> ProbeOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ProbeOutcome::Unreachable("connection refused".into())
        } else {
            ProbeOutcome::Reachable
        }
    }
}

fn fast_gate() -> GateSettings {
    GateSettings {
        initial_retry_limit: 5,
        initial_retry_delay: Duration::from_millis(1),
        reconnect_short_delay: Duration::from_millis(1),
        reconnect_long_delay: Duration::from_millis(1),
        reconnect_short_attempts: 10,
        ..GateSettings::default()
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(RetrySettings {
        max_attempts,
        delay: Duration::from_millis(1),
    })
}

struct Harness {
    orchestrator: FallbackOrchestrator,
    stats: Arc<RunStats>,
    probe_calls: Arc<AtomicU32>,
}

fn harness(
    primary: &[(&str, Arc<ScriptedProvider>)],
    fallbacks: &[(&str, Arc<ScriptedProvider>)],
    probe_failures: u32,
    retry: RetryPolicy,
) -> Harness {
    let handle = |(label, p): &(&str, Arc<ScriptedProvider>)| {
        ProviderHandle::new(*label, p.clone() as Arc<dyn ProviderClient>)
    };
    let tiers = ProviderTiers {
        primary: primary.iter().map(handle).collect(),
        fallbacks: fallbacks.iter().map(handle).collect(),
    };
    let labels: Vec<String> = primary
        .iter()
        .chain(fallbacks)
        .map(|(l, _)| l.to_string())
        .collect();
    let stats = Arc::new(RunStats::new(&labels));
    let probe_calls = Arc::new(AtomicU32::new(0));
    let gate = ConnectivityGate::new(
        Box::new(ScriptedProbe {
            failures: probe_failures,
            calls: Arc::clone(&probe_calls),
        }),
        fast_gate(),
    );
    Harness {
        orchestrator: FallbackOrchestrator::new(tiers, gate, retry, stats.clone()),
        stats,
        probe_calls,
    }
}

fn job(page: usize) -> PageJob {
    PageJob::new(
        page,
        PageImage::new(format!("page-{page}").into_bytes(), "image/png"),
        None,
        format!("translate page {page}"),
    )
}

/// Write `page_<n>.png` files holding `page-<n>` and return their paths.
fn page_images(dir: &Path, count: usize) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    (1..=count)
        .map(|n| {
            let path = dir.join(format!("page_{n}.png"));
            std::fs::write(&path, format!("page-{n}")).unwrap();
            path
        })
        .collect()
}

#[derive(Default)]
struct ErrorCounter {
    errors: Mutex<Vec<usize>>,
}

impl TranslationProgressCallback for ErrorCounter {
    fn on_page_error(&self, _document: &str, page_num: usize, _error: &str) {
        self.errors.lock().unwrap().push(page_num);
    }
}

// ── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_primary_routes_to_secondary_which_sticks() {
    let pro = ScriptedProvider::healthy("pro");
    let flash = ScriptedProvider::healthy("flash");
    let aliyun = ScriptedProvider::new(|page, n| {
        if n == 0 {
            Err(ProviderError::Timeout)
        } else {
            Ok(format!("aliyun translated {page}."))
        }
    });
    let silicon = ScriptedProvider::healthy("silicon");

    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone()), ("gemini-2.5-flash", flash.clone())],
        &[("qwen-vl-max", aliyun.clone()), ("Qwen/QVQ-72B-Preview", silicon.clone())],
        u32::MAX,
        fast_retry(5),
    );

    let text = h.orchestrator.translate_page(&job(1)).await.unwrap();
    assert_eq!(text, "aliyun translated page-1.");
    assert_eq!(h.probe_calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        h.orchestrator.state().sticky_provider(),
        Some(ProviderIdentity::Fallback(0))
    );
    assert!(!h.orchestrator.state().has_ever_connected());

    let aliyun_usage = h.stats.usage("qwen-vl-max");
    assert_eq!((aliyun_usage.failure, aliyun_usage.success), (1, 1));
    assert_eq!(h.stats.usage("Qwen/QVQ-72B-Preview").total(), 0);
    assert_eq!(pro.calls() + flash.calls() + silicon.calls(), 0);

    // Next page goes straight to the locked-in tier: no probe, no primary.
    let text = h.orchestrator.translate_page(&job(2)).await.unwrap();
    assert_eq!(text, "aliyun translated page-2.");
    assert_eq!(h.probe_calls.load(Ordering::SeqCst), 5);
    assert_eq!(aliyun.calls(), 3);
    assert_eq!(pro.calls() + flash.calls() + silicon.calls(), 0);
}

#[tokio::test]
async fn locked_in_tier_is_never_left_even_when_it_fails() {
    let pro = ScriptedProvider::healthy("pro");
    let aliyun = ScriptedProvider::broken();
    let silicon = ScriptedProvider::new(|page, _| {
        if page == "page-2" {
            Err(ProviderError::EmptyResponse)
        } else {
            Ok(format!("silicon translated {page}."))
        }
    });

    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone())],
        &[("qwen-vl-max", aliyun.clone()), ("Qwen/QVQ-72B-Preview", silicon.clone())],
        u32::MAX,
        fast_retry(2),
    );

    tokio_test::assert_ok!(h.orchestrator.translate_page(&job(1)).await);
    assert_eq!(
        h.orchestrator.state().sticky_provider(),
        Some(ProviderIdentity::Fallback(1))
    );
    let probes_after_first_page = h.probe_calls.load(Ordering::SeqCst);
    let aliyun_after_first_page = aliyun.calls();

    let err = tokio_test::assert_err!(h.orchestrator.translate_page(&job(2)).await);
    assert!(matches!(
        err,
        OrchestrationError::ExhaustedRetries { ref provider, attempts: 2, .. }
            if provider == "Qwen/QVQ-72B-Preview"
    ));
    tokio_test::assert_ok!(h.orchestrator.translate_page(&job(3)).await);

    assert_eq!(
        h.orchestrator.state().sticky_provider(),
        Some(ProviderIdentity::Fallback(1))
    );
    assert_eq!(h.probe_calls.load(Ordering::SeqCst), probes_after_first_page);
    assert_eq!(aliyun.calls(), aliyun_after_first_page);
    assert_eq!(pro.calls(), 0);
}

#[tokio::test]
async fn primary_success_marks_connected_without_sticking() {
    let pro = ScriptedProvider::healthy("pro");
    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone())],
        &[("qwen-vl-max", aliyun.clone())],
        0,
        fast_retry(5),
    );

    for page in 1..=3 {
        tokio_test::assert_ok!(h.orchestrator.translate_page(&job(page)).await);
    }
    assert!(h.orchestrator.state().has_ever_connected());
    assert_eq!(h.orchestrator.state().sticky_provider(), None);
    assert_eq!(h.probe_calls.load(Ordering::SeqCst), 3);
    assert_eq!(pro.calls(), 3);
    assert_eq!(aliyun.calls(), 0);
}

#[tokio::test]
async fn primary_variants_get_one_attempt_each() {
    let pro = ScriptedProvider::broken();
    let flash = ScriptedProvider::healthy("flash");
    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone()), ("gemini-2.5-flash", flash.clone())],
        &[("qwen-vl-max", aliyun.clone())],
        0,
        fast_retry(5),
    );

    let text = h.orchestrator.translate_page(&job(1)).await.unwrap();
    assert_eq!(text, "flash translated page-1.");
    assert_eq!((pro.calls(), flash.calls(), aliyun.calls()), (1, 1, 0));
    assert_eq!(h.orchestrator.state().sticky_provider(), None);
    assert_eq!(h.stats.usage("gemini-2.5-pro").failure, 1);
}

#[tokio::test]
async fn failing_primary_falls_through_to_retried_fallback() {
    let pro = ScriptedProvider::broken();
    let flash = ScriptedProvider::broken();
    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone()), ("gemini-2.5-flash", flash.clone())],
        &[("qwen-vl-max", aliyun.clone())],
        0,
        fast_retry(5),
    );

    tokio_test::assert_ok!(h.orchestrator.translate_page(&job(1)).await);
    assert_eq!((pro.calls(), flash.calls()), (1, 1));
    assert!(h.orchestrator.state().has_ever_connected());
    assert_eq!(
        h.orchestrator.state().sticky_provider(),
        Some(ProviderIdentity::Fallback(0))
    );
}

#[tokio::test]
async fn every_tier_failing_is_all_providers_exhausted() {
    let pro = ScriptedProvider::broken();
    let aliyun = ScriptedProvider::broken();
    let silicon = ScriptedProvider::new(|_, _| Ok("   ".into()));
    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone())],
        &[("qwen-vl-max", aliyun.clone()), ("Qwen/QVQ-72B-Preview", silicon.clone())],
        0,
        fast_retry(3),
    );

    let err = h.orchestrator.translate_page(&job(4)).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::AllProvidersExhausted { page: 4, .. }));
    assert_eq!((pro.calls(), aliyun.calls(), silicon.calls()), (1, 3, 3));
    assert_eq!(h.orchestrator.state().sticky_provider(), None);
    assert_eq!(h.stats.usage("Qwen/QVQ-72B-Preview").failure, 3);
}

#[tokio::test]
async fn without_primary_tier_the_gate_is_never_consulted() {
    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], u32::MAX, fast_retry(5));

    tokio_test::assert_ok!(h.orchestrator.translate_page(&job(1)).await);
    assert_eq!(h.probe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(aliyun.calls(), 1);
}

// ── Connectivity gate ────────────────────────────────────────────────────────

/// Answers once, then stays down for `outage` probes.
struct OutageProbe {
    outage: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ConnectivityProbe for OutageProbe {
    async fn probe(&self) -> ProbeOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 || n > self.outage {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::TimedOut
        }
    }
}

#[tokio::test]
async fn outage_after_first_connection_waits_past_bounded_limit() {
    let pro = ScriptedProvider::healthy("pro");
    let aliyun = ScriptedProvider::healthy("aliyun");
    let calls = Arc::new(AtomicU32::new(0));
    let gate = ConnectivityGate::new(
        Box::new(OutageProbe {
            outage: 12,
            calls: Arc::clone(&calls),
        }),
        fast_gate(),
    );
    let tiers = ProviderTiers {
        primary: vec![ProviderHandle::new("gemini-2.5-pro", pro.clone() as Arc<dyn ProviderClient>)],
        fallbacks: vec![ProviderHandle::new("qwen-vl-max", aliyun.clone() as Arc<dyn ProviderClient>)],
    };
    let mut orchestrator =
        FallbackOrchestrator::new(tiers, gate, fast_retry(5), Arc::new(RunStats::new(&[])));

    tokio_test::assert_ok!(orchestrator.translate_page(&job(1)).await);
    assert!(orchestrator.state().has_ever_connected());

    tokio_test::assert_ok!(orchestrator.translate_page(&job(2)).await);
    let probes = calls.load(Ordering::SeqCst);
    assert_eq!(probes, 14);
    assert!(probes - 1 > fast_gate().initial_retry_limit);
    assert_eq!(pro.calls(), 2);
    assert_eq!(aliyun.calls(), 0);
}

// ── Retry policy ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_exhaustion_honours_attempts_and_delay() {
    let broken = ScriptedProvider::broken();
    let handle = ProviderHandle::new("qwen-vl-max", broken.clone() as Arc<dyn ProviderClient>);
    let policy = RetryPolicy::new(RetrySettings {
        max_attempts: 4,
        delay: Duration::from_millis(25),
    });
    let stats = RunStats::new(&[]);

    let start = Instant::now();
    let err = policy
        .run(&handle, &job(1).image, "prompt", &stats)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(broken.calls(), 4);
    assert!(elapsed >= Duration::from_millis(75), "elapsed {elapsed:?}");
    assert!(matches!(
        err,
        OrchestrationError::ExhaustedRetries {
            attempts: 4,
            last_cause: ProviderError::Http { status: 503, .. },
            ..
        }
    ));
    assert_eq!(stats.usage("qwen-vl-max").failure, 4);
}

// ── Document loop ────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_page_becomes_placeholder_and_later_pages_continue() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 3);
    let store = ProgressStore::new(dir.path().join("output"));

    let aliyun = ScriptedProvider::new(|page, _| {
        if page == "page-2" {
            Err(ProviderError::Malformed("truncated JSON".into()))
        } else {
            Ok(format!("Translated {page}."))
        }
    });
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], 0, fast_retry(2));
    let callback = ErrorCounter::default();

    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &callback,
    )
    .await;

    assert_eq!(
        doc.progress.texts(),
        &[
            "Translated page-1.".to_string(),
            error_placeholder(2),
            "Translated page-3.".to_string()
        ]
    );
    assert_eq!((doc.translated, doc.failed, doc.resumed_from), (2, 1, 0));
    assert_eq!(*callback.errors.lock().unwrap(), vec![2]);

    let stored = store.load("paper").await.unwrap();
    assert_eq!(stored, doc.progress);

    // The page after a placeholder gets no continuation hint.
    let prompts = aliyun.prompts.lock().unwrap();
    let page3_prompt = prompts.last().unwrap();
    assert!(page3_prompt.contains("page 3"));
    assert!(!page3_prompt.contains("previous page"));
}

#[tokio::test]
async fn resume_skips_stored_pages_and_uses_their_context() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 3);
    let store = ProgressStore::new(dir.path().join("output"));

    let mut stored = TranslationProgress::new();
    stored.push("第一页的开头。第一页的结尾句子。");
    store.save("paper", &stored).await.unwrap();

    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], 0, fast_retry(2));

    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &NoopProgressCallback,
    )
    .await;

    assert_eq!(doc.resumed_from, 1);
    assert_eq!(doc.progress.len(), 3);
    assert_eq!(doc.progress.texts()[0], "第一页的开头。第一页的结尾句子。");
    assert_eq!(aliyun.calls(), 2);

    let prompts = aliyun.prompts.lock().unwrap();
    assert!(prompts[0].contains("page 2"));
    assert!(prompts[0].contains("第一页的开头。 第一页的结尾句子。"));
    assert!(prompts[1].contains("aliyun translated page-2."));
}

#[tokio::test]
async fn completed_document_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 2);
    let store = ProgressStore::new(dir.path().join("output"));

    let mut stored = TranslationProgress::new();
    stored.push("one");
    stored.push(error_placeholder(2));
    store.save("paper", &stored).await.unwrap();

    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], 0, fast_retry(2));
    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &NoopProgressCallback,
    )
    .await;

    assert_eq!(aliyun.calls(), 0);
    assert_eq!(doc.progress, stored);
    assert!(is_error_placeholder(&doc.progress.texts()[1]));
}

#[tokio::test]
async fn corrupt_progress_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 2);
    let store = ProgressStore::new(dir.path().join("output"));
    std::fs::create_dir_all(store.document_dir("paper")).unwrap();
    std::fs::write(store.path("paper"), "not json at all").unwrap();

    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], 0, fast_retry(2));
    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &NoopProgressCallback,
    )
    .await;

    assert_eq!(doc.resumed_from, 0);
    assert_eq!(doc.progress.len(), 2);
    assert_eq!(store.load("paper").await.unwrap().len(), 2);
}

#[tokio::test]
async fn sticky_tier_carries_over_to_the_next_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::new(dir.path().join("output"));
    let first = page_images(&dir.path().join("a"), 2);
    let second = page_images(&dir.path().join("b"), 2);

    let pro = ScriptedProvider::healthy("pro");
    let aliyun = ScriptedProvider::broken();
    let silicon = ScriptedProvider::healthy("silicon");
    let mut h = harness(
        &[("gemini-2.5-pro", pro.clone())],
        &[("qwen-vl-max", aliyun.clone()), ("Qwen/QVQ-72B-Preview", silicon.clone())],
        u32::MAX,
        fast_retry(2),
    );
    let builder = PageContextBuilder::default();

    translate_document(&mut h.orchestrator, &store, &builder, "a", &first, &NoopProgressCallback).await;
    let probes = h.probe_calls.load(Ordering::SeqCst);
    let aliyun_calls = aliyun.calls();
    translate_document(&mut h.orchestrator, &store, &builder, "b", &second, &NoopProgressCallback).await;

    assert_eq!(h.probe_calls.load(Ordering::SeqCst), probes);
    assert_eq!(aliyun.calls(), aliyun_calls);
    assert_eq!(silicon.calls(), 4);
    assert_eq!(pro.calls(), 0);
}

#[tokio::test]
async fn stored_progress_longer_than_document_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 2);
    let store = ProgressStore::new(dir.path().join("output"));

    let mut stored = TranslationProgress::new();
    for t in ["one", "two", "three"] {
        stored.push(t);
    }
    store.save("paper", &stored).await.unwrap();

    let aliyun = ScriptedProvider::healthy("aliyun");
    let mut h = harness(&[], &[("qwen-vl-max", aliyun.clone())], 0, fast_retry(2));
    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &NoopProgressCallback,
    )
    .await;

    assert_eq!(doc.progress.texts(), &["one".to_string(), "two".to_string()]);
    assert_eq!(aliyun.calls(), 0);
    assert_eq!(store.load("paper").await.unwrap().len(), 2);
}

#[tokio::test]
async fn reply_that_cleans_to_nothing_is_not_a_translation() {
    let dir = tempfile::tempdir().unwrap();
    let images = page_images(&dir.path().join("images"), 2);
    let store = ProgressStore::new(dir.path().join("output"));

    let aliyun = ScriptedProvider::new(|_, _| Ok("```markdown\n\n```".into()));
    let silicon = ScriptedProvider::new(|page, _| {
        if page == "page-1" {
            Ok("```markdown\nSilicon translated page-1.\n```".into())
        } else {
            Ok("```\n\n```".into())
        }
    });
    let mut h = harness(
        &[],
        &[("qwen-vl-max", aliyun.clone()), ("Qwen/QVQ-72B-Preview", silicon.clone())],
        0,
        fast_retry(2),
    );

    let doc = translate_document(
        &mut h.orchestrator,
        &store,
        &PageContextBuilder::default(),
        "paper",
        &images,
        &NoopProgressCallback,
    )
    .await;

    assert_eq!(
        doc.progress.texts(),
        &["Silicon translated page-1.".to_string(), error_placeholder(2)]
    );
    assert_eq!((doc.translated, doc.failed), (1, 1));
    assert_eq!(h.stats.usage("qwen-vl-max").failure, 2);
    assert_eq!(h.stats.usage("Qwen/QVQ-72B-Preview").failure, 2);
}
