//! Language-model provider seam.
//!
//! Vendor clients live in the agent crate. The runner only needs an id and a
//! `call` that returns the raw response text or an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for a single provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unparsable provider response: {0}")]
    Parse(String),

    #[error("Provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Prompt sent identically to every provider in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPrompt {
    /// Instructions and output contract.
    pub system: String,
    /// Candidate, issue and tagged evidence.
    pub user: String,
}

/// A language model that can be asked for a stance.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier used for ordering and tie-breaks.
    fn id(&self) -> &str;

    async fn call(&self, prompt: &AnalysisPrompt) -> ProviderResult<String>;
}

/// Shared reference to a provider client.
pub type SharedProvider = Arc<dyn ProviderClient>;
