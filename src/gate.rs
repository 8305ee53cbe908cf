//! Connectivity gate in front of the primary provider tier.
//!
//! The primary vendor sits behind a network path that is sometimes down for
//! minutes at a time. Before each primary attempt the gate probes a cheap,
//! unauthenticated endpoint and decides:
//!
//! ```text
//! probe ok ───────────────────────────────▶ Ready   (has_ever_connected = true)
//! probe fails, network seen before ───────▶ wait until it answers ─▶ Ready
//! probe fails, never seen ────────────────▶ bounded probes ─▶ Ready | GaveUp
//! ```
//!
//! "Never seen" means the network may be structurally unavailable (wrong
//! region, firewall), so the gate gives up quickly and lets the orchestrator
//! fall back. Once the network has answered at least once, a failure is
//! assumed transient and the gate waits for it to return.

use crate::config::GateSettings;
use crate::orchestrator::OrchestratorState;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one probe. Never an error: every failure is a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered with a success status.
    Reachable,
    /// The endpoint answered, but with an unexpected status. The network
    /// path works, so this counts as reachable.
    UnexpectedStatus(u16),
    /// The probe timed out.
    TimedOut,
    /// Connection, DNS or TLS failure.
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable | ProbeOutcome::UnexpectedStatus(_))
    }
}

/// Something that can tell whether the primary network path is up.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Plain `GET` against a fixed URL with a short timeout.
pub struct HttpProbe {
    http: Option<reqwest::Client>,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build();
        if let Err(ref e) = http {
            warn!("Cannot build connectivity probe client: {}", e);
        }
        Self {
            http: http.ok(),
            url: url.into(),
        }
    }

    pub fn from_settings(settings: &GateSettings) -> Self {
        Self::new(settings.probe_url.clone(), settings.probe_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        let Some(ref http) = self.http else {
            return ProbeOutcome::Unreachable("no HTTP client".to_string());
        };
        match http.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Reachable,
            Ok(resp) => ProbeOutcome::UnexpectedStatus(resp.status().as_u16()),
            Err(e) if e.is_timeout() => ProbeOutcome::TimedOut,
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

/// Gate verdict for one primary attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The network answered; attempt the primary tier.
    Ready,
    /// The bounded budget (or the optional reconnection cap) ran out; skip
    /// the primary tier.
    GaveUp,
}

/// Probe policy over [`OrchestratorState::has_ever_connected`].
pub struct ConnectivityGate {
    probe: Box<dyn ConnectivityProbe>,
    settings: GateSettings,
}

impl ConnectivityGate {
    pub fn new(probe: Box<dyn ConnectivityProbe>, settings: GateSettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Probe once, then follow the bounded or unbounded path on failure.
    pub async fn check(&self, state: &mut OrchestratorState) -> GateDecision {
        let outcome = self.probe.probe().await;
        if outcome.is_reachable() {
            state.mark_connected();
            return GateDecision::Ready;
        }

        warn!("Cannot reach {}: {:?}", self.settings.probe_url, outcome);
        if state.has_ever_connected() {
            self.wait_for_reconnect(state).await
        } else {
            self.bounded_retry(state).await
        }
    }

    /// Never connected: `initial_retry_limit` probes in total, fixed delay.
    async fn bounded_retry(&self, state: &mut OrchestratorState) -> GateDecision {
        let limit = self.settings.initial_retry_limit;
        for attempt in 2..=limit {
            warn!(
                "Retrying connection in {:?} ({}/{}, {} left)",
                self.settings.initial_retry_delay,
                attempt,
                limit,
                limit - attempt
            );
            tokio::time::sleep(self.settings.initial_retry_delay).await;
            if self.probe.probe().await.is_reachable() {
                state.mark_connected();
                info!("Connection established");
                return GateDecision::Ready;
            }
        }
        warn!("No connection after {} probes; falling back", limit);
        GateDecision::GaveUp
    }

    /// Previously connected: probe until the network returns.
    async fn wait_for_reconnect(&self, state: &mut OrchestratorState) -> GateDecision {
        let mut attempt: u32 = 1;
        loop {
            if let Some(cap) = self.settings.max_reconnect_attempts {
                if attempt > cap {
                    warn!("Connection still down after {} reconnection probes", cap);
                    return GateDecision::GaveUp;
                }
            }
            let delay = self.settings.reconnect_delay(attempt);
            warn!(
                "Network lost after a previous connection; waiting {:?} (attempt {})",
                delay, attempt
            );
            tokio::time::sleep(delay).await;
            if self.probe.probe().await.is_reachable() {
                state.mark_connected();
                info!("Network connection restored");
                return GateDecision::Ready;
            }
            attempt += 1;
        }
    }
}
