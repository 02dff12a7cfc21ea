//! Triangulation runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`TRIANGULATION_*`)
//! 2. Values from a TOML file
//! 3. Built-in defaults
//!
//! | Key                                 | Default |
//! |-------------------------------------|---------|
//! | `chunking.chunk_size_words`         | 200     |
//! | `chunking.overlap_words`            | 40      |
//! | `retrieval.top_k`                   | 8       |
//! | `retrieval.min_score`               | 0.7     |
//! | `retrieval.max_context_words`       | 1500    |
//! | `retrieval.dedup_similarity`        | 0.97    |
//! | `analysis.provider_timeout_secs`    | 30      |
//! | `analysis.batch_deadline_secs`      | 90      |
//! | `arbitration.agreement_threshold`   | 0.75    |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_CHUNK_SIZE_WORDS: usize = 200;
const DEFAULT_OVERLAP_WORDS: usize = 40;
const DEFAULT_TOP_K: usize = 8;
const DEFAULT_MIN_SCORE: f32 = 0.7;
const DEFAULT_MAX_CONTEXT_WORDS: usize = 1500;
const DEFAULT_DEDUP_SIMILARITY: f64 = 0.97;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BATCH_DEADLINE_SECS: u64 = 90;
const DEFAULT_AGREEMENT_THRESHOLD: f64 = 0.75;

/// Environment-variable names for overrides.
pub const ENV_CHUNK_SIZE_WORDS: &str = "TRIANGULATION_CHUNK_SIZE_WORDS";
pub const ENV_CHUNK_OVERLAP_WORDS: &str = "TRIANGULATION_CHUNK_OVERLAP_WORDS";
pub const ENV_TOP_K: &str = "TRIANGULATION_TOP_K";
pub const ENV_MIN_SCORE: &str = "TRIANGULATION_MIN_SCORE";
pub const ENV_MAX_CONTEXT_WORDS: &str = "TRIANGULATION_MAX_CONTEXT_WORDS";
pub const ENV_AGREEMENT_THRESHOLD: &str = "TRIANGULATION_AGREEMENT_THRESHOLD";
pub const ENV_PROVIDER_TIMEOUT_SECS: &str = "TRIANGULATION_PROVIDER_TIMEOUT_SECS";
pub const ENV_BATCH_DEADLINE_SECS: &str = "TRIANGULATION_BATCH_DEADLINE_SECS";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_words: DEFAULT_CHUNK_SIZE_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum chunks retrieved per query.
    pub top_k: usize,
    /// Minimum clamped cosine score for a chunk to count as evidence.
    pub min_score: f32,
    /// Word budget for the assembled context block.
    pub max_context_words: usize,
    /// Text similarity at which two chunks are the same chunk.
    pub dedup_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            max_context_words: DEFAULT_MAX_CONTEXT_WORDS,
            dedup_similarity: DEFAULT_DEDUP_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider_timeout_secs: u64,
    pub batch_deadline_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            batch_deadline_secs: DEFAULT_BATCH_DEADLINE_SECS,
        }
    }
}

impl AnalysisConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Pairwise score at or above which two claims agree.
    pub agreement_threshold: f64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            agreement_threshold: DEFAULT_AGREEMENT_THRESHOLD,
        }
    }
}

/// Top-level configuration for the triangulation core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub analysis: AnalysisConfig,
    pub arbitration: ArbitrationConfig,
}

impl TriangulationConfig {
    /// Parse from TOML text without applying overrides.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults overlaid with environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRIANGULATION_*` overrides using `lookup` as the variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, ENV_CHUNK_SIZE_WORDS, &mut self.chunking.chunk_size_words)?;
        override_value(&lookup, ENV_CHUNK_OVERLAP_WORDS, &mut self.chunking.overlap_words)?;
        override_value(&lookup, ENV_TOP_K, &mut self.retrieval.top_k)?;
        override_value(&lookup, ENV_MIN_SCORE, &mut self.retrieval.min_score)?;
        override_value(&lookup, ENV_MAX_CONTEXT_WORDS, &mut self.retrieval.max_context_words)?;
        override_value(
            &lookup,
            ENV_AGREEMENT_THRESHOLD,
            &mut self.arbitration.agreement_threshold,
        )?;
        override_value(
            &lookup,
            ENV_PROVIDER_TIMEOUT_SECS,
            &mut self.analysis.provider_timeout_secs,
        )?;
        override_value(
            &lookup,
            ENV_BATCH_DEADLINE_SECS,
            &mut self.analysis.batch_deadline_secs,
        )?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunking.chunk_size_words == 0 {
            return Err(ConfigError::Invalid(
                "chunking.chunk_size_words must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.min_score must be in [0, 1], got {}",
                self.retrieval.min_score
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.dedup_similarity) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.dedup_similarity must be in [0, 1], got {}",
                self.retrieval.dedup_similarity
            )));
        }
        if self.retrieval.max_context_words == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_context_words must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.arbitration.agreement_threshold) {
            return Err(ConfigError::Invalid(format!(
                "arbitration.agreement_threshold must be in [0, 1], got {}",
                self.arbitration.agreement_threshold
            )));
        }
        if self.analysis.provider_timeout_secs == 0 || self.analysis.batch_deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "analysis timeouts must be > 0 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_value<T, F>(lookup: &F, key: &str, slot: &mut T) -> ConfigResult<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}
