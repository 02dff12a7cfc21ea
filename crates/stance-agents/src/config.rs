//! Agent configuration: providers, embedding endpoint and pipeline tuning.
//!
//! Everything lives in one TOML file. The `[triangulation]` table is the core
//! crate's `TriangulationConfig`; the rest describes the clients built here.
//!
//! ```toml
//! insufficient_evidence = "skip"
//! agreement = "lexical"
//!
//! [triangulation.retrieval]
//! top_k = 8
//!
//! [embedding]
//! kind = "openai_compatible"
//! base_url = "http://localhost:8080/v1"
//! model = "nomic-embed-text"
//! dimensions = 768
//!
//! [[providers]]
//! id = "local-qwen"
//! kind = "openai_compatible"
//! base_url = "http://localhost:8080/v1"
//! model = "Qwen3-32B"
//!
//! [[providers]]
//! id = "claude"
//! kind = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//!
//! # Evidence for an issue is limited to chunks sharing one of its tags
//! [issue_tags]
//! Healthcare = ["healthcare", "medicaid"]
//! ```
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`TRIANGULATION_*`, `STANCE_EMBEDDING_*`)
//! 2. Values from the TOML file
//! 3. Built-in defaults (hashing embedder, no providers)
//!
//! API keys are never stored in the file; a provider names the environment
//! variable that holds its key.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use triangulation::config::{ConfigError, TriangulationConfig};
use triangulation::pipeline::InsufficientEvidencePolicy;

/// Default OpenAI-compatible base URL (local llama.cpp / vLLM server).
const DEFAULT_OPENAI_BASE_URL: &str = "http://localhost:8080/v1";
/// Default Anthropic API base URL.
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Environment-variable names for embedding overrides.
pub const ENV_EMBEDDING_URL: &str = "STANCE_EMBEDDING_URL";
pub const ENV_EMBEDDING_MODEL: &str = "STANCE_EMBEDDING_MODEL";
pub const ENV_EMBEDDING_DIMENSIONS: &str = "STANCE_EMBEDDING_DIMENSIONS";

/// Error type for agent configuration and client construction.
#[derive(Debug, thiserror::Error)]
pub enum AgentsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Provider '{provider}' needs an API key in ${var}")]
    MissingApiKey { provider: String, var: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Result type for agent configuration.
pub type AgentsResult<T> = Result<T, AgentsError>;

/// Wire protocol spoken by a provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions`.
    OpenAiCompatible,
    /// `POST {base_url}/messages`.
    Anthropic,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAiCompatible => write!(f, "openai_compatible"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// One language model taking part in triangulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Stable id; also the arbitration tie-break key.
    pub id: String,
    pub kind: ProviderKind,
    /// Falls back to the kind's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, ProviderKind::OpenAiCompatible) => DEFAULT_OPENAI_BASE_URL,
            (None, ProviderKind::Anthropic) => DEFAULT_ANTHROPIC_BASE_URL,
        }
    }

    /// Resolve the API key through `lookup`.
    ///
    /// Local OpenAI-compatible servers may run without a key; Anthropic
    /// always needs one, and a named variable must be set.
    pub fn api_key_from<F>(&self, lookup: F) -> AgentsResult<Option<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = match (&self.api_key_env, self.kind) {
            (Some(var), _) => var.clone(),
            (None, ProviderKind::OpenAiCompatible) => return Ok(None),
            (None, ProviderKind::Anthropic) => "ANTHROPIC_API_KEY".to_string(),
        };
        match lookup(&var).filter(|key| !key.trim().is_empty()) {
            Some(key) => Ok(Some(key)),
            None => Err(AgentsError::MissingApiKey {
                provider: self.id.clone(),
                var,
            }),
        }
    }
}

/// Which embedder backs the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    /// Local deterministic bag-of-words embedder.
    #[default]
    Hashing,
    /// `POST {base_url}/embeddings`.
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub kind: EmbeddingKind,
    pub base_url: Option<String>,
    /// Remote model name; ignored by the hashing embedder.
    pub model: String,
    pub dimensions: usize,
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            kind: EmbeddingKind::Hashing,
            base_url: None,
            model: String::new(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            api_key_env: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
    }
}

/// How claims are compared during arbitration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementMode {
    /// Word-set overlap.
    #[default]
    Lexical,
    /// Cosine over the corpus embedder's vectors.
    Embedding,
}

/// Top-level configuration for the `stance-agents` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub triangulation: TriangulationConfig,
    pub embedding: EmbeddingConfig,
    pub providers: Vec<ProviderConfig>,
    pub insufficient_evidence: InsufficientEvidencePolicy,
    pub agreement: AgreementMode,
    /// Issue name → tags its evidence must carry; unlisted issues are unfiltered.
    pub issue_tags: BTreeMap<String, BTreeSet<String>>,
}

impl AgentsConfig {
    /// Parse from TOML text without applying overrides.
    pub fn from_toml_str(text: &str) -> AgentsResult<Self> {
        toml::from_str(text).map_err(|e| AgentsError::Parse(e.to_string()))
    }

    /// Load a TOML file (or defaults when `path` is `None`), apply
    /// environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> AgentsResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> AgentsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.triangulation.apply_overrides_from(&lookup)?;
        if let Some(url) = lookup(ENV_EMBEDDING_URL) {
            self.embedding.base_url = Some(url);
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            self.embedding.model = model;
        }
        if let Some(raw) = lookup(ENV_EMBEDDING_DIMENSIONS) {
            self.embedding.dimensions = raw.trim().parse().map_err(|_| {
                AgentsError::Invalid(format!("{ENV_EMBEDDING_DIMENSIONS}={raw} is not a number"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> AgentsResult<()> {
        self.triangulation.validate()?;

        if self.embedding.dimensions == 0 {
            return Err(AgentsError::Invalid(
                "embedding.dimensions must be > 0".to_string(),
            ));
        }
        if self.embedding.kind == EmbeddingKind::OpenAiCompatible
            && self.embedding.model.trim().is_empty()
        {
            return Err(AgentsError::Invalid(
                "embedding.model is required for remote embeddings".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(AgentsError::Invalid("provider id must not be empty".to_string()));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(AgentsError::Invalid(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(AgentsError::Invalid(format!(
                    "provider '{}' has no model",
                    provider.id
                )));
            }
            if provider.max_tokens == 0 {
                return Err(AgentsError::Invalid(format!(
                    "provider '{}' max_tokens must be > 0",
                    provider.id
                )));
            }
        }

        for (issue, tags) in &self.issue_tags {
            if tags.iter().any(|tag| tag.trim().is_empty()) {
                return Err(AgentsError::Invalid(format!(
                    "issue_tags.{issue} contains an empty tag"
                )));
            }
        }
        Ok(())
    }
}
