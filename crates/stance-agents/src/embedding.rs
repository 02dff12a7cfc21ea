//! Embedder selection and the OpenAI-compatible `/embeddings` client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use triangulation::corpus::{
    EmbeddingError, EmbeddingProvider, EmbeddingResult, EmbeddingVersion, HashingEmbedder,
    SharedEmbedder,
};

use crate::config::{AgentsResult, EmbeddingConfig, EmbeddingKind};

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Remote embedder speaking the OpenAI `/embeddings` protocol.
pub struct RemoteEmbedder {
    endpoint: String,
    version: EmbeddingVersion,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: format!("{}/embeddings", config.base_url()),
            version: EmbeddingVersion::new(config.model.clone(), config.dimensions),
            api_key,
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Decode a response body into vectors in input order.
fn decode_embeddings(body: &str, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
    let mut response: EmbeddingsResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
    if response.data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }
    // Servers may return items out of order; `index` is authoritative when present
    if response.data.iter().all(|d| d.index.is_some()) {
        response.data.sort_by_key(|d| d.index);
    }
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn version(&self) -> EmbeddingVersion {
        self.version.clone()
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingsRequest {
            model: &self.version.model,
            input: texts,
        };
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(EmbeddingError::Request(format!("HTTP {status}: {body}")));
        }
        decode_embeddings(&body, texts.len())
    }
}

/// Build the embedder named by `config`.
pub fn build_embedder(config: &EmbeddingConfig) -> AgentsResult<SharedEmbedder> {
    let embedder: SharedEmbedder = match config.kind {
        EmbeddingKind::Hashing => HashingEmbedder::new(config.dimensions).shared(),
        EmbeddingKind::OpenAiCompatible => {
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            Arc::new(RemoteEmbedder::new(
                config,
                api_key,
                crate::providers::http_client()?,
            ))
        }
    };
    let version = embedder.version();
    info!(
        kind = ?config.kind,
        model = %version.model,
        dimensions = version.dimensions,
        "Embedder configured"
    );
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> EmbeddingConfig {
        EmbeddingConfig {
            kind: EmbeddingKind::OpenAiCompatible,
            base_url: Some("http://embed:8080/v1".to_string()),
            model: "nomic-embed-text".to_string(),
            dimensions: 3,
            api_key_env: None,
        }
    }

    #[test]
    fn test_decode_reorders_by_index() {
        let body = r#"{"object":"list","data":[
            {"object":"embedding","index":1,"embedding":[0.0,1.0,0.0]},
            {"object":"embedding","index":0,"embedding":[1.0,0.0,0.0]}
        ],"model":"nomic-embed-text"}"#;
        let vectors = decode_embeddings(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_decode_count_mismatch() {
        let body = r#"{"data":[{"embedding":[1.0]}]}"#;
        let err = decode_embeddings(body, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
        assert!(decode_embeddings("{}", 1).is_err());
    }

    #[test]
    fn test_remote_version_and_endpoint() {
        let embedder = RemoteEmbedder::new(&remote_config(), None, reqwest::Client::new());
        assert_eq!(embedder.endpoint(), "http://embed:8080/v1/embeddings");
        assert_eq!(embedder.version(), EmbeddingVersion::new("nomic-embed-text", 3));
    }

    #[test]
    fn test_build_hashing_embedder() {
        let config = EmbeddingConfig {
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.version().dimensions, 64);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let embedder = RemoteEmbedder::new(&remote_config(), None, reqwest::Client::new());
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
