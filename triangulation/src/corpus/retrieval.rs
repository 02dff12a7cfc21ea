//! Retrieval assembler: candidate + issue query → bounded context block.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::builder::CorpusResult;
use super::embedding::{check_dimensions, SharedEmbedder};
use super::similarity::text_similarity;
use super::store::SharedCorpusStore;
use super::types::{ChunkId, RetrievalResult, SearchFilter};
use crate::config::RetrievalConfig;

/// One retrieval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub race_id: String,
    /// Candidate display name, used in the query text.
    pub candidate: String,
    pub issue: String,
    /// Restrict to chunks attributed to this candidate reference.
    #[serde(default)]
    pub candidate_ref: Option<String>,
    /// Restrict to chunks sharing one of these issue tags.
    #[serde(default)]
    pub issue_tags: Option<BTreeSet<String>>,
}

impl RetrievalQuery {
    pub fn new(
        race_id: impl Into<String>,
        candidate: impl Into<String>,
        issue: impl Into<String>,
    ) -> Self {
        Self {
            race_id: race_id.into(),
            candidate: candidate.into(),
            issue: issue.into(),
            candidate_ref: None,
            issue_tags: None,
        }
    }

    pub fn with_candidate_ref(mut self, candidate_ref: impl Into<String>) -> Self {
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

    /// Text embedded to search the corpus.
    pub fn query_text(&self) -> String {
        format!("{} position on {}", self.candidate, self.issue)
    }

    pub fn filter(&self) -> SearchFilter {
        SearchFilter {
            race_id: self.race_id.clone(),
            candidate_ref: self.candidate_ref.clone(),
            issue_tags: self.issue_tags.clone(),
        }
    }
}

/// Evidence handed to the analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Results included in `context`, in score order.
    pub results: Vec<RetrievalResult>,
    /// `[chunk_id] text` blocks separated by blank lines.
    pub context: String,
    /// Words of chunk text included in `context`.
    pub word_count: usize,
    /// Whether the word budget cut results or text.
    pub truncated: bool,
}

impl RetrievedContext {
    /// Empty context, used when analysing without evidence.
    pub fn empty() -> Self {
        Self::default()
    }

    /// No chunk cleared the similarity threshold.
    pub fn is_insufficient(&self) -> bool {
        self.results.is_empty()
    }

    pub fn chunk_ids(&self) -> BTreeSet<ChunkId> {
        self.results.iter().map(|r| r.chunk_id.clone()).collect()
    }

    /// Build a context block from ranked results under a word budget.
    ///
    /// Results whose text is a near-duplicate of an already kept result are
    /// dropped. A first result longer than the budget is cut to the budget;
    /// otherwise packing stops at the first result that does not fit.
    pub fn from_results(
        ranked: Vec<RetrievalResult>,
        max_context_words: usize,
        dedup_similarity: f64,
    ) -> Self {
        let mut out = Self::default();
        let mut blocks: Vec<String> = Vec::new();

        for mut result in ranked {
            if out
                .results
                .iter()
                .any(|kept| text_similarity(&kept.text, &result.text) >= dedup_similarity)
            {
                continue;
            }

            let words: Vec<&str> = result.text.split_whitespace().collect();
            let remaining = max_context_words.saturating_sub(out.word_count);
            if words.len() > remaining {
                out.truncated = true;
                if !out.results.is_empty() || remaining == 0 {
                    break;
                }
                result.text = words[..remaining].join(" ");
            }

            let n = result.text.split_whitespace().count();
            blocks.push(format!("[{}] {}", result.chunk_id, result.text));
            out.word_count += n;
            out.results.push(result);
        }

        out.context = blocks.join("\n\n");
        out
    }
}

/// Retrieves and assembles evidence for a candidate + issue.
pub struct RetrievalAssembler {
    embedder: SharedEmbedder,
    store: SharedCorpusStore,
    config: RetrievalConfig,
}

impl RetrievalAssembler {
    pub fn new(embedder: SharedEmbedder, store: SharedCorpusStore, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed the query, search, dedup, and pack a context block.
    ///
    /// An empty context is insufficient evidence, not an error.
    pub async fn assemble(&self, query: &RetrievalQuery) -> CorpusResult<RetrievedContext> {
        let query_text = query.query_text();
        let vector = self.embedder.embed(&query_text).await?;
        check_dimensions(&self.embedder.version(), &vector)?;

        let ranked = self.store.search(
            &vector,
            &query.filter(),
            self.config.top_k,
            self.config.min_score,
        )?;
        let hits = ranked.len();

        let context = RetrievedContext::from_results(
            ranked,
            self.config.max_context_words,
            self.config.dedup_similarity,
        );

        debug!(
            race_id = %query.race_id,
            candidate = %query.candidate,
            issue = %query.issue,
            hits,
            kept = context.results.len(),
            words = context.word_count,
            truncated = context.truncated,
            "Assembled retrieval context"
        );
        Ok(context)
    }
}
