//! Provider clients: one remote vision endpoint each, behind one trait.
//!
//! Every client takes `(image, prompt)` and returns translated text or a
//! [`ProviderError`]. Clients never retry; retry and tier switching belong
//! to [`crate::retry`] and [`crate::orchestrator`].
//!
//! | Client | Endpoint |
//! |--------|----------|
//! | [`gemini::GeminiClient`] | Google Gemini `streamGenerateContent` (SSE) |
//! | [`openai::OpenAiCompatClient`] | any `/chat/completions` endpoint (DashScope, SiliconFlow, …) |
//! | [`llm::LlmProviderClient`] | any `edgequake_llm` provider from the factory |

pub mod gemini;
pub mod llm;
pub mod openai;

use crate::config::{ProviderChain, ProviderKind, ProviderSpec, TranslatorConfig};
use crate::error::{ProviderError, TranslateError};
use crate::pipeline::encode::PageImage;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A single remote inference endpoint.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Translate one page image.
    ///
    /// Implementations must map an empty body and a missing content field to
    /// [`ProviderError::EmptyResponse`].
    async fn translate(&self, image: &PageImage, prompt: &str) -> Result<String, ProviderError>;
}

/// Position of a provider in the fallback chain, ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderIdentity {
    /// Variant `n` of the primary tier (0 = preferred model).
    Primary(usize),
    /// Fallback tier `n` (0 = secondary, 1 = tertiary, …).
    Fallback(usize),
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderIdentity::Primary(0) => write!(f, "primary"),
            ProviderIdentity::Primary(n) => write!(f, "primary variant {n}"),
            ProviderIdentity::Fallback(n) => write!(f, "fallback tier {}", n + 1),
        }
    }
}

/// A client plus the label used in logs and stats.
#[derive(Clone)]
pub struct ProviderHandle {
    pub label: String,
    pub client: Arc<dyn ProviderClient>,
}

impl ProviderHandle {
    pub fn new(label: impl Into<String>, client: Arc<dyn ProviderClient>) -> Self {
        Self {
            label: label.into(),
            client,
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("label", &self.label)
            .field("client", &"<dyn ProviderClient>")
            .finish()
    }
}

/// Request parameters shared by every client of a run.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl RequestOptions {
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self {
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// Instantiated tiers of a run.
#[derive(Debug, Clone, Default)]
pub struct ProviderTiers {
    pub primary: Vec<ProviderHandle>,
    pub fallbacks: Vec<ProviderHandle>,
}

/// Instantiate one spec.
pub fn build_client(
    spec: &ProviderSpec,
    options: &RequestOptions,
) -> Result<Arc<dyn ProviderClient>, TranslateError> {
    let init_err = |detail: String| TranslateError::ProviderInit {
        label: spec.label.clone(),
        detail,
    };
    let client: Arc<dyn ProviderClient> = match &spec.kind {
        ProviderKind::Gemini {
            base_url,
            model,
            api_key,
        } => Arc::new(
            gemini::GeminiClient::new(base_url, model, api_key.clone().unwrap_or_default(), options)
                .map_err(init_err)?,
        ),
        ProviderKind::OpenAiCompatible {
            base_url,
            model,
            api_key,
        } => Arc::new(
            openai::OpenAiCompatClient::new(
                base_url,
                model,
                api_key.clone().unwrap_or_default(),
                options,
            )
            .map_err(init_err)?,
        ),
        ProviderKind::Factory { provider, model } => {
            Arc::new(llm::LlmProviderClient::from_factory(provider, model, options).map_err(init_err)?)
        }
    };
    Ok(client)
}

/// Instantiate every configured spec of `chain`.
///
/// Specs without credentials are skipped with a warning so a missing key
/// never costs a full retry budget at run time.
pub fn build_tiers(
    chain: &ProviderChain,
    options: &RequestOptions,
) -> Result<ProviderTiers, TranslateError> {
    let build = |specs: &[ProviderSpec]| -> Result<Vec<ProviderHandle>, TranslateError> {
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            if !spec.is_configured() {
                warn!("Provider '{}' has no API key configured; skipping", spec.label);
                continue;
            }
            handles.push(ProviderHandle::new(spec.label.clone(), build_client(spec, options)?));
        }
        Ok(handles)
    };

    let tiers = ProviderTiers {
        primary: build(&chain.primary)?,
        fallbacks: build(&chain.fallbacks)?,
    };

    if tiers.primary.is_empty() && tiers.fallbacks.is_empty() {
        return Err(TranslateError::ProviderNotConfigured {
            hint: "Set GOOGLE_API_KEY, DASHSCOPE_API_KEY or QWEN_API_KEY, \
                   or add a tier with --extra-fallback provider:model."
                .to_string(),
        });
    }

    info!(
        "Provider chain: primary [{}], fallbacks [{}]",
        tiers.primary.iter().map(|h| h.label.as_str()).collect::<Vec<_>>().join(", "),
        tiers.fallbacks.iter().map(|h| h.label.as_str()).collect::<Vec<_>>().join(", "),
    );
    Ok(tiers)
}

/// Map a reqwest failure to the call-level error taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Map a non-success HTTP status to the call-level error taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let detail = crate::error::truncate_detail(body, 300);
    match status.as_u16() {
        code @ (401 | 403) => ProviderError::Auth {
            status: code,
            detail,
        },
        code => ProviderError::Http { status: code, body: detail },
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())
}
