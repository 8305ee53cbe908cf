//! OpenAI-compatible `/chat/completions` endpoints with image input.
//!
//! Aliyun DashScope (compatible mode) and SiliconFlow both speak this
//! protocol, so one client covers every Qwen-VL tier.

use super::{http_client, status_error, transport_error, ProviderClient, RequestOptions};
use crate::error::ProviderError;
use crate::pipeline::encode::PageImage;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    options: RequestOptions,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        options: &RequestOptions,
    ) -> Result<Self, String> {
        Ok(Self {
            http: http_client(options.timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            options: options.clone(),
        })
    }

    fn request_body(&self, image: &PageImage, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.options.system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": image.to_data_url() } }
                    ]
                }
            ],
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    async fn translate(&self, image: &PageImage, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image, prompt))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let text = parse_completion(&body)?;
        debug!("{}: {} chars", self.model, text.len());
        Ok(text)
    }
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Extract `choices[0].message.content` from a completion body.
pub fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let completion: Completion = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}
