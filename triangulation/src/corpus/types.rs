//! Core types for the retrieval corpus.
//!
//! Chunks are immutable once written. A superseded source is removed with
//! `CorpusStore::delete_source` and re-ingested, never edited in place.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a stored chunk (`"{source_id}#{position_index}"`).
pub type ChunkId = String;

/// Identifier of a fetched source document.
pub type SourceId = String;

/// Identifier of an electoral race.
pub type RaceId = String;

/// Embedding model version carried by every chunk and by the store itself.
///
/// Two corpora built with different models (or the same model at a different
/// output size) are not comparable, so the version is checked on every write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingVersion {
    /// Model name or revision tag.
    pub model: String,
    /// Vector length produced by the model.
    pub dimensions: usize,
}

impl EmbeddingVersion {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }
}

impl std::fmt::Display for EmbeddingVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.model, self.dimensions)
    }
}

/// Normalized source text handed over by the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub source_id: SourceId,
    pub race_id: RaceId,
    #[serde(default)]
    pub candidate_ref: Option<String>,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
    /// Issue tags assigned upstream, copied onto every chunk of this source.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub issue_tags: BTreeSet<String>,
}

impl ExtractedContent {
    pub fn new(
        source_id: impl Into<String>,
        race_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            race_id: race_id.into(),
            candidate_ref: None,
            text: text.into(),
            fetched_at: Utc::now(),
            issue_tags: BTreeSet::new(),
        }
    }

    pub fn with_candidate(mut self, candidate_ref: impl Into<String>) -> Self {
        self.candidate_ref = Some(candidate_ref.into());
        self
    }

    pub fn with_issue_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issue_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// An embedded slice of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub source_id: SourceId,
    pub race_id: RaceId,
    pub candidate_ref: Option<String>,
    #[serde(default)]
    pub issue_tags: BTreeSet<String>,
    pub text: String,
    pub vector: Vec<f32>,
    /// Position of this chunk within its source, starting at 0.
    pub position_index: u32,
    pub embedding_version: EmbeddingVersion,
}

impl Chunk {
    /// Deterministic chunk identifier for a source position.
    pub fn chunk_id_for(source_id: &str, position_index: u32) -> ChunkId {
        format!("{source_id}#{position_index}")
    }

    /// Key used for per-source write serialization and dedup scope.
    pub(crate) fn source_key(&self) -> (RaceId, SourceId) {
        (self.race_id.clone(), self.source_id.clone())
    }
}

/// Metadata filter applied to corpus searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub race_id: RaceId,
    /// Restrict to chunks attributed to this candidate.
    pub candidate_ref: Option<String>,
    /// Restrict to chunks sharing at least one of these tags.
    pub issue_tags: Option<BTreeSet<String>>,
}

impl SearchFilter {
    pub fn race(race_id: impl Into<String>) -> Self {
        Self {
            race_id: race_id.into(),
            candidate_ref: None,
            issue_tags: None,
        }
    }

    pub fn with_candidate(mut self, candidate_ref: impl Into<String>) -> Self {
        self.candidate_ref = Some(candidate_ref.into());
        self
    }

    pub fn with_issue_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issue_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a chunk passes every populated criterion.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if chunk.race_id != self.race_id {
            return false;
        }
        if let Some(ref candidate) = self.candidate_ref {
            if chunk.candidate_ref.as_deref() != Some(candidate.as_str()) {
                return false;
            }
        }
        if let Some(ref tags) = self.issue_tags {
            if !tags.is_empty() && chunk.issue_tags.is_disjoint(tags) {
                return false;
            }
        }
        true
    }
}

/// A single search hit; produced per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub source_id: SourceId,
    /// Cosine similarity clamped to [0, 1].
    pub score: f32,
    pub text: String,
    pub position_index: u32,
}

/// Per-race corpus summary, for observability only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub race_id: RaceId,
    pub chunk_count: usize,
    pub distinct_sources: usize,
    /// Chunk count per candidate; chunks without a candidate are not listed.
    pub coverage_per_candidate: BTreeMap<String, usize>,
}
