//! Embedding provider seam.
//!
//! The corpus only needs `embed(text) -> vector` plus a stable version tag.
//! Remote clients live in the agent crate; `HashingEmbedder` is a local,
//! deterministic bag-of-words embedder used for offline corpus builds and
//! tests.

use std::sync::Arc;

use async_trait::async_trait;

use super::similarity::normalize_in_place;
use super::types::EmbeddingVersion;

/// Error type for embedding calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },
}

/// Result type for embedding calls.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Maps text to a fixed-length vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model version tag; every vector this provider returns has
    /// `version().dimensions` elements.
    fn version(&self) -> EmbeddingVersion;

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Shared reference to an embedding provider.
pub type SharedEmbedder = Arc<dyn EmbeddingProvider>;

/// Check a returned vector against the provider's declared dimensions.
pub fn check_dimensions(version: &EmbeddingVersion, vector: &[f32]) -> EmbeddingResult<()> {
    if vector.len() != version.dimensions {
        return Err(EmbeddingError::Dimensions {
            expected: version.dimensions,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Model tag reported by [`HashingEmbedder`].
pub const HASHING_MODEL: &str = "hashing-blake3-v1";

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed (BLAKE3) into `dimensions`
/// buckets with a sign taken from the digest, then L2-normalized. Texts
/// with shared vocabulary land close together; nothing here is semantic.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn shared(self) -> SharedEmbedder {
        Arc::new(self)
    }

    /// Synchronous embedding, also used by `embed`.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let (bucket, sign) = token_feature(&token, self.dimensions);
            vector[bucket] += sign;
        }
        normalize_in_place(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn version(&self) -> EmbeddingVersion {
        EmbeddingVersion::new(HASHING_MODEL, self.dimensions)
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Bucket from the first eight digest bytes, sign from the ninth.
fn token_feature(token: &str, dimensions: usize) -> (usize, f32) {
    let digest = blake3::hash(token.as_bytes());
    let bytes = digest.as_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    let bucket = (u64::from_le_bytes(head) % dimensions as u64) as usize;
    let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
    (bucket, sign)
}
