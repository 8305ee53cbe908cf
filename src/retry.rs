//! Bounded, fixed-delay retry around one provider call.
//!
//! No backoff growth and no jitter: fallback tiers are paid per call and
//! sequential, so there is no thundering herd to spread out. The delay is
//! only taken before an attempt that will actually happen.

use crate::config::RetrySettings;
use crate::error::{OrchestrationError, ProviderError};
use crate::pipeline::encode::PageImage;
use crate::pipeline::postprocess::clean_translation;
use crate::provider::ProviderHandle;
use crate::stats::{CallOutcome, StatsSink};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Call `handle` until it returns non-empty text or the budget runs out.
    pub async fn run(
        &self,
        handle: &ProviderHandle,
        image: &PageImage,
        prompt: &str,
        stats: &dyn StatsSink,
    ) -> Result<String, OrchestrationError> {
        let max = self.settings.max_attempts.max(1);
        let mut last_cause = ProviderError::EmptyResponse;

        for attempt in 1..=max {
            info!("Calling {} (attempt {}/{})", handle.label, attempt, max);
            match call_once(handle, image, prompt, stats).await {
                Ok(text) => {
                    info!("{} succeeded", handle.label);
                    return Ok(text);
                }
                Err(e) => {
                    warn!("{} failed: {}", handle.label, e);
                    last_cause = e;
                }
            }
            if attempt < max {
                warn!(
                    "Retrying {} in {:?} ({} attempts left)",
                    handle.label,
                    self.settings.delay,
                    max - attempt
                );
                tokio::time::sleep(self.settings.delay).await;
            }
        }

        error!("{}: all {} attempts failed", handle.label, max);
        Err(OrchestrationError::ExhaustedRetries {
            provider: handle.label.clone(),
            attempts: max,
            last_cause,
        })
    }
}

/// One call, reported to `stats`. The reply is cleaned with
/// [`clean_translation`]; text that cleans to nothing counts as a failure.
pub async fn call_once(
    handle: &ProviderHandle,
    image: &PageImage,
    prompt: &str,
    stats: &dyn StatsSink,
) -> Result<String, ProviderError> {
    let start = Instant::now();
    let result = match handle.client.translate(image, prompt).await {
        Ok(text) => {
            let cleaned = clean_translation(&text);
            if cleaned.trim().is_empty() {
                Err(ProviderError::EmptyResponse)
            } else {
                Ok(cleaned)
            }
        }
        Err(e) => Err(e),
    };
    let duration = start.elapsed();

    match &result {
        Ok(_) => stats.record_call(CallOutcome::success(&handle.label, duration)),
        Err(e) => stats.record_call(CallOutcome::failure(
            &handle.label,
            duration,
            describe_request(&handle.label, image, prompt),
            e.to_string(),
        )),
    }
    result
}

/// Redacted request description for forensic logs.
fn describe_request(label: &str, image: &PageImage, prompt: &str) -> serde_json::Value {
    json!({
        "model": label,
        "prompt": prompt,
        "image": { "mime_type": image.mime_type(), "bytes": image.bytes().len() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderClient;
    use crate::stats::RunStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns `Err` or `bad_text` for the first `bad` calls, then text.
    struct Scripted {
        bad: u32,
        bad_text: Option<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderClient for Scripted {
        async fn translate(&self, _: &PageImage, _: &str) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.bad {
                if let Some(text) = self.bad_text {
                    Ok(text.into())
                } else {
                    Err(ProviderError::Http {
                        status: 500,
                        body: "boom".into(),
                    })
                }
            } else {
                Ok(format!("text after {n} failures"))
            }
        }
    }

    fn handle(bad: u32, bad_text: Option<&'static str>) -> (ProviderHandle, Arc<Scripted>) {
        let client = Arc::new(Scripted {
            bad,
            bad_text,
            calls: AtomicU32::new(0),
        });
        (ProviderHandle::new("scripted", client.clone()), client)
    }

    fn policy(attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy::new(RetrySettings {
            max_attempts: attempts,
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn image() -> PageImage {
        PageImage::new(vec![1, 2, 3], "image/png")
    }

    #[tokio::test]
    async fn succeeds_on_later_attempt() {
        let (h, client) = handle(2, None);
        let stats = RunStats::new(&[]);
        let text = policy(5, 1).run(&h, &image(), "p", &stats).await.unwrap();
        assert_eq!(text, "text after 2 failures");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.usage("scripted").failure, 2);
        assert_eq!(stats.usage("scripted").success, 1);
    }

    #[tokio::test]
    async fn blank_text_counts_as_failed_attempt() {
        let (h, client) = handle(u32::MAX, Some("  \n"));
        let stats = RunStats::new(&[]);
        let err = policy(3, 1).run(&h, &image(), "p", &stats).await.unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            OrchestrationError::ExhaustedRetries {
                last_cause: ProviderError::EmptyResponse,
                attempts: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fenced_empty_reply_is_retried() {
        let (h, client) = handle(1, Some("```markdown\n\n```"));
        let stats = RunStats::new(&[]);
        let text = policy(3, 1).run(&h, &image(), "p", &stats).await.unwrap();
        assert_eq!(text, "text after 1 failures");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.usage("scripted").failure, 1);
    }

    #[tokio::test]
    async fn reply_is_returned_cleaned() {
        let (h, _) = handle(1, Some("```markdown\n你好  \n```"));
        let stats = RunStats::new(&[]);
        let text = call_once(&h, &image(), "p", &stats).await.unwrap();
        assert_eq!(text, "你好");
        assert_eq!(stats.usage("scripted").success, 1);
    }

    #[tokio::test]
    async fn no_sleep_after_last_attempt() {
        let (h, _) = handle(u32::MAX, None);
        let stats = RunStats::new(&[]);
        let start = Instant::now();
        let _ = policy(1, 500).run(&h, &image(), "p", &stats).await;
        assert!(start.elapsed() < Duration::from_millis(400));
    }
}
