//! Google Gemini over REST (`streamGenerateContent` with `alt=sse`).
//!
//! The streaming endpoint answers with `data: {json}` lines, each carrying a
//! chunk of the candidate text. The full body is read and the chunks are
//! concatenated; a body that yields no text is an empty response.

use super::{http_client, status_error, transport_error, ProviderClient, RequestOptions};
use crate::error::ProviderError;
use crate::pipeline::encode::PageImage;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    options: RequestOptions,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        options: &RequestOptions,
    ) -> Result<Self, String> {
        Ok(Self {
            http: http_client(options.timeout)?,
            endpoint: format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                base_url.trim_end_matches('/'),
                model
            ),
            model: model.to_string(),
            api_key,
            options: options.clone(),
        })
    }

    fn request_body(&self, image: &PageImage, prompt: &str) -> Value {
        let safety: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect();
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": format!("{}\n\n{}", self.options.system_prompt, prompt) },
                    { "inline_data": { "mime_type": image.mime_type(), "data": image.to_base64() } }
                ]
            }],
            "safetySettings": safety,
            "generationConfig": {
                "temperature": self.options.temperature,
                "maxOutputTokens": self.options.max_tokens
            }
        })
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn translate(&self, image: &PageImage, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(image, prompt))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let text = parse_sse_body(&body)?;
        debug!("{}: {} chars", self.model, text.len());
        Ok(text)
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenate the text chunks of an SSE response body.
///
/// Chunks that fail to decode are counted; when nothing decoded at all the
/// body is [`ProviderError::Malformed`], otherwise a body without text is
/// [`ProviderError::EmptyResponse`].
pub fn parse_sse_body(body: &str) -> Result<String, ProviderError> {
    let mut text = String::new();
    let mut decoded = 0usize;
    let mut malformed = 0usize;

    for line in body.lines() {
        let Some(payload) = line.trim().strip_prefix("data:") else {
            continue;
        };
        match serde_json::from_str::<StreamChunk>(payload.trim()) {
            Ok(chunk) => {
                decoded += 1;
                let parts = chunk
                    .candidates
                    .into_iter()
                    .take(1)
                    .filter_map(|c| c.content)
                    .flat_map(|c| c.parts)
                    .filter_map(|p| p.text);
                for part in parts {
                    text.push_str(&part);
                }
            }
            Err(_) => malformed += 1,
        }
    }

    if decoded == 0 && malformed > 0 {
        return Err(ProviderError::Malformed(format!(
            "{malformed} undecodable SSE chunks"
        )));
    }
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}
