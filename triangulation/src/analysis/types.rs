//! Stance claims produced by individual providers.

use serde::{Deserialize, Serialize};

/// One provider's structured stance for a (candidate, issue) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StanceClaim {
    pub provider_id: String,
    pub issue: String,
    pub candidate: String,
    pub stance_text: String,
    /// Chunk ids the provider cited, in the order given.
    #[serde(default)]
    pub cited_chunk_ids: Vec<String>,
    /// Provider's own confidence in [0, 1], if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_confidence_self_report: Option<f64>,
}

impl StanceClaim {
    pub fn new(
        provider_id: impl Into<String>,
        candidate: impl Into<String>,
        issue: impl Into<String>,
        stance_text: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            issue: issue.into(),
            candidate: candidate.into(),
            stance_text: stance_text.into(),
            cited_chunk_ids: Vec::new(),
            raw_confidence_self_report: None,
        }
    }

    pub fn with_citations<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cited_chunk_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.raw_confidence_self_report = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Self-reported confidence, with a missing report counted as 0.0.
    pub fn confidence_or_zero(&self) -> f64 {
        self.raw_confidence_self_report.unwrap_or(0.0)
    }
}
