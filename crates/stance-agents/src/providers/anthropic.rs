//! Anthropic Messages API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use triangulation::analysis::{AnalysisPrompt, ProviderClient, ProviderError, ProviderResult};

use super::{request_error, response_text};
use crate::config::ProviderConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicProvider {
    id: String,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig, api_key: String, http: reqwest::Client) -> Self {
        Self {
            id: config.id.clone(),
            endpoint: format!("{}/messages", config.base_url()),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&'a self, prompt: &'a AnalysisPrompt) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &prompt.system,
            messages: vec![Message {
                role: "user",
                content: &prompt.user,
            }],
        }
    }
}

/// Concatenate the text blocks of a Messages response.
fn message_text(body: &str) -> ProviderResult<String> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return Err(ProviderError::Parse("no text content in message".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl ProviderClient for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, prompt: &AnalysisPrompt) -> ProviderResult<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(request_error)?;

        let body = response_text(response).await?;
        let text = message_text(&body)?;
        debug!(provider = %self.id, chars = text.len(), "Message received");
        Ok(text)
    }
}
