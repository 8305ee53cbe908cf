//! Configuration types for a translation run.
//!
//! Every knob lives in [`TranslatorConfig`], built via its
//! [`TranslatorConfigBuilder`]. Provider tiers are described by a
//! [`ProviderChain`]; when none is supplied the chain is read from the
//! environment at run time (see [`ProviderChain::from_env`]).

use crate::error::TranslateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Gemini REST base URL.
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Aliyun DashScope OpenAI-compatible base URL.
pub const DASHSCOPE_API_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
/// SiliconFlow OpenAI-compatible base URL.
pub const SILICONFLOW_API_URL: &str = "https://api.siliconflow.cn/v1";

pub const MODEL_GEMINI_PRO: &str = "gemini-2.5-pro";
pub const MODEL_GEMINI_FLASH: &str = "gemini-2.5-flash";
pub const MODEL_ALIYUN_QWEN: &str = "qwen-vl-max";
pub const MODEL_SILICONFLOW_QWEN: &str = "Qwen/QVQ-72B-Preview";

/// Well-known, unauthenticated endpoint used to decide whether the primary
/// vendor's network is reachable.
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com";

/// Configuration for a translation run.
///
/// # Example
/// ```rust
/// use pdftrans::TranslatorConfig;
///
/// let config = TranslatorConfig::builder()
///     .data_dir("papers")
///     .dpi(200)
///     .context_sentences(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct TranslatorConfig {
    /// Directory scanned for `*.pdf` inputs. Default: `Data`.
    pub data_dir: PathBuf,

    /// Working directory: page images, `progress.json`, error logs and run
    /// summaries. Default: `output`.
    pub output_dir: PathBuf,

    /// Directory receiving the merged translations. Default: `Trans`.
    pub trans_dir: PathBuf,

    /// Rasterisation DPI. Range: 72–600. Default: 300.
    ///
    /// Academic papers use small fonts for captions, footnotes and formula
    /// subscripts; 300 DPI keeps them legible to the vision model.
    pub dpi: u32,

    /// Sampling temperature sent to every provider. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4000.
    pub max_tokens: usize,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Bounded retry applied to every fallback tier.
    pub retry: RetrySettings,

    /// Connectivity gate in front of the primary tier.
    pub gate: GateSettings,

    /// Number of trailing sentences of the previous page passed as a
    /// continuation hint. Default: 2.
    pub context_sentences: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Custom per-page template (`{page_num}`, `{context_instruction}`).
    pub user_prompt_template: Option<String>,

    /// Custom continuation template (`{prev_context}`).
    pub context_template: Option<String>,

    /// Provider tiers. If None, uses [`ProviderChain::from_env`].
    pub providers: Option<ProviderChain>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            output_dir: PathBuf::from("output"),
            trans_dir: PathBuf::from("Trans"),
            dpi: 300,
            temperature: 0.2,
            max_tokens: 4000,
            api_timeout_secs: 60,
            retry: RetrySettings::default(),
            gate: GateSettings::default(),
            context_sentences: 2,
            system_prompt: None,
            user_prompt_template: None,
            context_template: None,
            providers: None,
        }
    }
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("data_dir", &self.data_dir)
            .field("output_dir", &self.output_dir)
            .field("trans_dir", &self.trans_dir)
            .field("dpi", &self.dpi)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("retry", &self.retry)
            .field("gate", &self.gate)
            .field("context_sentences", &self.context_sentences)
            .field("providers", &self.providers)
            .finish()
    }
}

impl TranslatorConfig {
    /// Create a new builder for `TranslatorConfig`.
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured chain, or the one described by the environment.
    pub fn provider_chain(&self) -> ProviderChain {
        self.providers.clone().unwrap_or_else(ProviderChain::from_env)
    }
}

/// Builder for [`TranslatorConfig`].
#[derive(Debug)]
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
}

impl TranslatorConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn trans_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.trans_dir = dir.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn gate(mut self, gate: GateSettings) -> Self {
        self.config.gate = gate;
        self
    }

    pub fn context_sentences(mut self, k: usize) -> Self {
        self.config.context_sentences = k;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.user_prompt_template = Some(template.into());
        self
    }

    pub fn context_template(mut self, template: impl Into<String>) -> Self {
        self.config.context_template = Some(template.into());
        self
    }

    pub fn providers(mut self, chain: ProviderChain) -> Self {
        self.config.providers = Some(chain);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslatorConfig, TranslateError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(TranslateError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(TranslateError::InvalidConfig(
                "Retry attempts must be ≥ 1".into(),
            ));
        }
        if c.gate.initial_retry_limit == 0 {
            return Err(TranslateError::InvalidConfig(
                "Initial connection attempts must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TranslateError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref t) = c.user_prompt_template {
            if !t.contains("{page_num}") {
                return Err(TranslateError::InvalidConfig(
                    "User prompt template must contain {page_num}".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Retry / gate settings ────────────────────────────────────────────────

/// Bounded, fixed-delay retry for one provider tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts per tier (first call included). Default: 5.
    pub max_attempts: u32,
    /// Fixed pause between attempts, no growth and no jitter. Default: 5 s.
    pub delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Connectivity gate in front of the primary tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Probe target. Default: [`DEFAULT_PROBE_URL`].
    pub probe_url: String,
    /// Per-probe timeout. Default: 5 s.
    pub probe_timeout: Duration,
    /// Probes made before giving up when the network has never been seen.
    /// Default: 5.
    pub initial_retry_limit: u32,
    /// Pause between those bounded probes. Default: 5 s.
    pub initial_retry_delay: Duration,
    /// Pause between reconnection probes for the first
    /// `reconnect_short_attempts` attempts. Default: 10 s.
    pub reconnect_short_delay: Duration,
    /// Pause between reconnection probes afterwards. Default: 30 s.
    pub reconnect_long_delay: Duration,
    /// Default: 10.
    pub reconnect_short_attempts: u32,
    /// Stop waiting after this many reconnection probes. `None` waits
    /// forever. Default: `None`.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout: Duration::from_secs(5),
            initial_retry_limit: 5,
            initial_retry_delay: Duration::from_secs(5),
            reconnect_short_delay: Duration::from_secs(10),
            reconnect_long_delay: Duration::from_secs(30),
            reconnect_short_attempts: 10,
            max_reconnect_attempts: None,
        }
    }
}

impl GateSettings {
    /// Delay before reconnection probe number `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        if attempt < self.reconnect_short_attempts {
            self.reconnect_short_delay
        } else {
            self.reconnect_long_delay
        }
    }
}

// ── Provider chain ───────────────────────────────────────────────────────

/// Wire protocol and credentials of one provider endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini REST (`streamGenerateContent`, SSE).
    Gemini {
        base_url: String,
        model: String,
        api_key: Option<String>,
    },
    /// Any `/chat/completions` endpoint accepting `image_url` parts.
    OpenAiCompatible {
        base_url: String,
        model: String,
        api_key: Option<String>,
    },
    /// A provider created by `edgequake_llm::ProviderFactory`, which reads
    /// its own credentials from the environment.
    Factory { provider: String, model: String },
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        match self {
            ProviderKind::Gemini {
                base_url,
                model,
                api_key,
            } => f
                .debug_struct("Gemini")
                .field("base_url", base_url)
                .field("model", model)
                .field("api_key", &redact(api_key))
                .finish(),
            ProviderKind::OpenAiCompatible {
                base_url,
                model,
                api_key,
            } => f
                .debug_struct("OpenAiCompatible")
                .field("base_url", base_url)
                .field("model", model)
                .field("api_key", &redact(api_key))
                .finish(),
            ProviderKind::Factory { provider, model } => f
                .debug_struct("Factory")
                .field("provider", provider)
                .field("model", model)
                .finish(),
        }
    }
}

/// One provider endpoint plus the label used in logs and stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub label: String,
    pub kind: ProviderKind,
}

impl ProviderSpec {
    pub fn gemini(model: impl Into<String>, api_key: Option<String>) -> Self {
        let model = model.into();
        Self {
            label: model.clone(),
            kind: ProviderKind::Gemini {
                base_url: GEMINI_API_URL.to_string(),
                model,
                api_key,
            },
        }
    }

    pub fn openai_compatible(
        label: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            label: label.into(),
            kind: ProviderKind::OpenAiCompatible {
                base_url: base_url.into(),
                model: model.into(),
                api_key,
            },
        }
    }

    pub fn factory(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let provider = provider.into();
        let model = model.into();
        Self {
            label: format!("{provider}/{model}"),
            kind: ProviderKind::Factory { provider, model },
        }
    }

    /// Parse `provider:model` (e.g. `openai:gpt-4.1-mini`) into a factory spec.
    pub fn parse_factory(s: &str) -> Result<Self, TranslateError> {
        match s.split_once(':') {
            Some((p, m)) if !p.trim().is_empty() && !m.trim().is_empty() => {
                Ok(Self::factory(p.trim(), m.trim()))
            }
            _ => Err(TranslateError::InvalidConfig(format!(
                "Expected provider:model, got '{s}'"
            ))),
        }
    }

    /// Whether the spec carries what it needs to authenticate.
    ///
    /// Factory specs resolve credentials themselves and always count as
    /// configured here.
    pub fn is_configured(&self) -> bool {
        match &self.kind {
            ProviderKind::Gemini { api_key, .. } | ProviderKind::OpenAiCompatible { api_key, .. } => {
                api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            }
            ProviderKind::Factory { .. } => true,
        }
    }
}

/// The ordered provider tiers of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderChain {
    /// Same-vendor variants tried once each, behind the connectivity gate.
    pub primary: Vec<ProviderSpec>,
    /// Fallback tiers in priority order, each wrapped in the retry policy.
    pub fallbacks: Vec<ProviderSpec>,
}

impl ProviderChain {
    /// Gemini Pro → Gemini Flash, then Aliyun Qwen, then SiliconFlow Qwen.
    ///
    /// Keys come from `GOOGLE_API_KEY`, `DASHSCOPE_API_KEY` and `QWEN_API_KEY`.
    pub fn from_env() -> Self {
        let key = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self::with_keys(
            key("GOOGLE_API_KEY"),
            key("DASHSCOPE_API_KEY"),
            key("QWEN_API_KEY"),
        )
    }

    /// The default chain with explicit credentials.
    pub fn with_keys(
        google: Option<String>,
        dashscope: Option<String>,
        siliconflow: Option<String>,
    ) -> Self {
        Self {
            primary: vec![
                ProviderSpec::gemini(MODEL_GEMINI_PRO, google.clone()),
                ProviderSpec::gemini(MODEL_GEMINI_FLASH, google),
            ],
            fallbacks: vec![
                ProviderSpec::openai_compatible(
                    MODEL_ALIYUN_QWEN,
                    DASHSCOPE_API_URL,
                    MODEL_ALIYUN_QWEN,
                    dashscope,
                ),
                ProviderSpec::openai_compatible(
                    MODEL_SILICONFLOW_QWEN,
                    SILICONFLOW_API_URL,
                    MODEL_SILICONFLOW_QWEN,
                    siliconflow,
                ),
            ],
        }
    }

    /// Labels of every spec, in priority order.
    pub fn labels(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.fallbacks.iter())
            .map(|s| s.label.clone())
            .collect()
    }
}
