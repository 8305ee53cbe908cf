//! Provider tier backed by any `edgequake_llm` provider.
//!
//! `ProviderFactory` knows OpenAI, Anthropic, Gemini, Azure, Ollama and other
//! vision backends and reads their credentials from the environment. Wrapping
//! a factory provider as a [`ProviderClient`] lets a run append any of them
//! as an extra fallback tier without a dedicated client.
//!
//! ## Message Layout
//!
//! 1. **System message**: the translation rules
//! 2. **User message**: the per-page prompt with the page image attached

use super::{ProviderClient, RequestOptions};
use crate::error::ProviderError;
use crate::pipeline::encode::PageImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

pub struct LlmProviderClient {
    provider: Arc<dyn LLMProvider>,
    options: RequestOptions,
}

impl LlmProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, options: &RequestOptions) -> Self {
        Self {
            provider,
            options: options.clone(),
        }
    }

    /// Instantiate a named provider with the given model.
    pub fn from_factory(
        provider_name: &str,
        model: &str,
        options: &RequestOptions,
    ) -> Result<Self, String> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model)
            .map_err(|e| format!("{e}"))?;
        Ok(Self::new(provider, options))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.options.temperature),
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProviderClient for LlmProviderClient {
    async fn translate(&self, image: &PageImage, prompt: &str) -> Result<String, ProviderError> {
        let image_data = ImageData::new(image.to_base64(), image.mime_type()).with_detail("high");
        let messages = vec![
            ChatMessage::system(self.options.system_prompt.as_str()),
            ChatMessage::user_with_images(prompt, vec![image_data]),
        ];
        let options = self.build_options();

        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(self.options.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|e| ProviderError::Transport(format!("{e}")))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(response.content)
    }
}
