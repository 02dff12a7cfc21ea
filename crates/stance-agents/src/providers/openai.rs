//! OpenAI-compatible chat completions client (llama.cpp, vLLM, hosted APIs).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use triangulation::analysis::{AnalysisPrompt, ProviderClient, ProviderError, ProviderResult};

use super::{request_error, response_text};
use crate::config::ProviderConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    id: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    http: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &ProviderConfig, api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            id: config.id.clone(),
            endpoint: format!("{}/chat/completions", config.base_url()),
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

    fn request<'a>(&'a self, prompt: &'a AnalysisPrompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Pull the assistant text out of a chat completion body.
///
/// Reasoning models served by llama.cpp sometimes leave `content` empty and
/// put the answer in `reasoning_content`; that is used as a fallback.
fn completion_text(body: &str) -> ProviderResult<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("no choices in completion".to_string()))?;

    let ResponseMessage {
        content,
        reasoning_content,
    } = choice.message;
    content
        .filter(|text| !text.trim().is_empty())
        .or(reasoning_content.filter(|text| !text.trim().is_empty()))
        .ok_or_else(|| ProviderError::Parse("empty completion".to_string()))
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, prompt: &AnalysisPrompt) -> ProviderResult<String> {
        let mut request = self.http.post(&self.endpoint).json(&self.request(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(request_error)?;
        let body = response_text(response).await?;
        let text = completion_text(&body)?;
        debug!(provider = %self.id, chars = text.len(), "Chat completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn provider(base_url: &str) -> OpenAiCompatibleProvider {
        let config = ProviderConfig {
            id: "local".to_string(),
            kind: ProviderKind::OpenAiCompatible,
            base_url: Some(base_url.to_string()),
            model: "Qwen3-32B".to_string(),
            api_key_env: None,
            max_tokens: 300,
            temperature: 0.2,
        };
        OpenAiCompatibleProvider::new(&config, None, reqwest::Client::new())
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        assert_eq!(
            provider("http://vasp-02:8080/v1/").endpoint(),
            "http://vasp-02:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_shape() {
        let p = provider("http://localhost:8080/v1");
        let prompt = AnalysisPrompt {
            system: "be neutral".to_string(),
            user: "Candidate: Jane".to_string(),
        };
        let json = serde_json::to_value(p.request(&prompt)).unwrap();
        assert_eq!(json["model"], "Qwen3-32B");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be neutral");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Candidate: Jane");
    }

    #[test]
    fn test_completion_text_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"stance\":\"supports\"}"},"finish_reason":"stop"}]}"#;
        assert_eq!(completion_text(body).unwrap(), r#"{"stance":"supports"}"#);
    }

    #[test]
    fn test_completion_text_reasoning_fallback() {
        let body = r#"{"choices":[{"message":{"content":"","reasoning_content":"{\"stance\":\"opposes\"}"}}]}"#;
        assert_eq!(completion_text(body).unwrap(), r#"{"stance":"opposes"}"#);
    }

    #[test]
    fn test_completion_text_errors() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            "not json",
        ] {
            let err = completion_text(body).unwrap_err();
            assert!(matches!(err, ProviderError::Parse(_)), "body: {body}");
        }
    }
}
