//! Fallback orchestration with sticky downgrade.
//!
//! ```text
//!            sticky set? ──yes──▶ RetryPolicy(sticky tier) ──▶ text | ExhaustedRetries
//!                 │ no
//!                 ▼
//!         ConnectivityGate ──GaveUp──────────────┐
//!                 │ Ready                        │
//!                 ▼                              ▼
//!   primary variants, one attempt each ──▶ fallback tiers in order,
//!                 │ ok                     RetryPolicy each; first success
//!                 ▼                        becomes sticky for the run
//!               text
//! ```
//!
//! [`OrchestratorState`] is owned by one orchestrator for one run. Both of
//! its fields only ever move from unset to set, so later documents in the
//! same run inherit the tightest routing discovered so far.

use crate::config::TranslatorConfig;
use crate::error::{OrchestrationError, TranslateError};
use crate::gate::{ConnectivityGate, GateDecision, HttpProbe};
use crate::pipeline::encode::PageImage;
use crate::provider::{build_tiers, ProviderHandle, ProviderIdentity, ProviderTiers, RequestOptions};
use crate::retry::{call_once, RetryPolicy};
use crate::stats::SharedStats;
use tracing::{error, info, warn};

/// Routing state of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    sticky_provider: Option<ProviderIdentity>,
    has_ever_connected: bool,
}

impl OrchestratorState {
    pub fn sticky_provider(&self) -> Option<ProviderIdentity> {
        self.sticky_provider
    }

    pub fn has_ever_connected(&self) -> bool {
        self.has_ever_connected
    }

    pub fn mark_connected(&mut self) {
        self.has_ever_connected = true;
    }

    /// Lock routing to `tier`. A tier already locked in is never replaced.
    pub fn stick_to(&mut self, tier: ProviderIdentity) {
        if self.sticky_provider.is_none() {
            self.sticky_provider = Some(tier);
        }
    }
}

/// One page to translate. Immutable once created.
#[derive(Debug, Clone)]
pub struct PageJob {
    /// 1-based page number.
    pub index: usize,
    pub image: PageImage,
    /// Translation of the preceding page, if any.
    pub prior_text: Option<String>,
    /// Fully rendered user prompt.
    pub prompt: String,
}

impl PageJob {
    pub fn new(
        index: usize,
        image: PageImage,
        prior_text: Option<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            index,
            image,
            prior_text,
            prompt: prompt.into(),
        }
    }
}

pub struct FallbackOrchestrator {
    primary: Vec<ProviderHandle>,
    fallbacks: Vec<ProviderHandle>,
    gate: ConnectivityGate,
    retry: RetryPolicy,
    stats: SharedStats,
    state: OrchestratorState,
}

impl FallbackOrchestrator {
    pub fn new(
        tiers: ProviderTiers,
        gate: ConnectivityGate,
        retry: RetryPolicy,
        stats: SharedStats,
    ) -> Self {
        Self {
            primary: tiers.primary,
            fallbacks: tiers.fallbacks,
            gate,
            retry,
            stats,
            state: OrchestratorState::default(),
        }
    }

    /// Build every configured tier plus an HTTP connectivity probe.
    pub fn from_config(config: &TranslatorConfig, stats: SharedStats) -> Result<Self, TranslateError> {
        let options = RequestOptions::from_config(config);
        let tiers = build_tiers(&config.provider_chain(), &options)?;
        let gate = ConnectivityGate::new(
            Box::new(HttpProbe::from_settings(&config.gate)),
            config.gate.clone(),
        );
        Ok(Self::new(tiers, gate, RetryPolicy::new(config.retry), stats))
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Labels of every instantiated provider, in priority order.
    pub fn labels(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(&self.fallbacks)
            .map(|h| h.label.clone())
            .collect()
    }

    fn handle(&self, id: ProviderIdentity) -> Option<&ProviderHandle> {
        match id {
            ProviderIdentity::Primary(i) => self.primary.get(i),
            ProviderIdentity::Fallback(i) => self.fallbacks.get(i),
        }
    }

    /// Translate one page with exactly one successful provider call.
    pub async fn translate_page(&mut self, job: &PageJob) -> Result<String, OrchestrationError> {
        if let Some(sticky) = self.state.sticky_provider {
            if let Some(handle) = self.handle(sticky) {
                info!("Page {}: using locked-in {} ({})", job.index, sticky, handle.label);
                return self
                    .retry
                    .run(handle, &job.image, &job.prompt, self.stats.as_ref())
                    .await;
            }
            warn!("Locked-in {} no longer exists; re-evaluating tiers", sticky);
        }

        let mut last_cause = String::from("no provider attempted");

        if !self.primary.is_empty() {
            match self.gate.check(&mut self.state).await {
                GateDecision::Ready => match self.try_primary(job).await {
                    Ok(text) => return Ok(text),
                    Err(cause) => last_cause = cause,
                },
                GateDecision::GaveUp => {
                    warn!("Page {}: primary network unreachable, skipping primary tier", job.index);
                    last_cause = "primary network unreachable".to_string();
                }
            }
        }

        for (i, handle) in self.fallbacks.iter().enumerate() {
            let tier = ProviderIdentity::Fallback(i);
            info!("Page {}: switching to {} ({})", job.index, tier, handle.label);
            match self
                .retry
                .run(handle, &job.image, &job.prompt, self.stats.as_ref())
                .await
            {
                Ok(text) => {
                    self.state.stick_to(tier);
                    info!("{} locked in for the rest of the run", handle.label);
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Page {}: {}", job.index, e);
                    last_cause = e.to_string();
                }
            }
        }

        error!("Page {}: every provider failed", job.index);
        Err(OrchestrationError::AllProvidersExhausted {
            page: job.index,
            last_cause,
        })
    }

    /// Each primary variant gets a single attempt.
    async fn try_primary(&self, job: &PageJob) -> Result<String, String> {
        let mut last = String::new();
        for (i, handle) in self.primary.iter().enumerate() {
            info!(
                "Page {}: calling {} ({})",
                job.index,
                ProviderIdentity::Primary(i),
                handle.label
            );
            match call_once(handle, &job.image, &job.prompt, self.stats.as_ref()).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Page {}: {} failed: {}", job.index, handle.label, e);
                    last = format!("{}: {}", handle.label, e);
                }
            }
        }
        Err(last)
    }
}
