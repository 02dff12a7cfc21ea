//! Pairwise agreement scoring between stance texts.
//!
//! The arbiter only needs a score in [0, 1] for two texts. Anything that
//! needs I/O (embedding the stances, asking a judge model) happens before
//! arbitration; the scorer itself is synchronous.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::corpus::similarity::similarity_score;
use crate::corpus::{EmbeddingResult, SharedEmbedder};

/// Strategy for comparing two stance texts.
pub trait AgreementScorer: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Agreement in [0, 1]; higher means the texts state the same position.
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Sørensen–Dice coefficient over lowercase word sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalAgreement;

impl LexicalAgreement {
    fn words(text: &str) -> BTreeSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

impl AgreementScorer for LexicalAgreement {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        let a = Self::words(a);
        let b = Self::words(b);
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count();
        (2 * shared) as f64 / (a.len() + b.len()) as f64
    }
}

/// Cosine agreement over stance embeddings computed up front.
///
/// Texts missing from the precomputed set fall back to lexical scoring.
#[derive(Debug, Clone, Default)]
pub struct VectorAgreement {
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorAgreement {
    /// Embed every distinct text once.
    pub async fn build<I, S>(embedder: &SharedEmbedder, texts: I) -> EmbeddingResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vectors = HashMap::new();
        for text in texts {
            let text = text.as_ref();
            if vectors.contains_key(text) {
                continue;
            }
            let vector = embedder.embed(text).await?;
            vectors.insert(text.to_string(), vector);
        }
        Ok(Self { vectors })
    }

    pub fn from_vectors(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl AgreementScorer for VectorAgreement {
    fn name(&self) -> &str {
        "vector"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        match (self.vectors.get(a), self.vectors.get(b)) {
            (Some(va), Some(vb)) => f64::from(similarity_score(va, vb)),
            _ => LexicalAgreement.score(a, b),
        }
    }
}

/// Scores supplied ahead of time per unordered text pair.
///
/// Suits results of a dedicated comparison call. Identical texts score 1.0;
/// pairs without an entry score 0.0.
#[derive(Debug, Clone, Default)]
pub struct PairwiseTable {
    scores: BTreeMap<(String, String), f64>,
}

impl PairwiseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, a: &str, b: &str, score: f64) -> Self {
        self.insert(a, b, score);
        self
    }

    pub fn insert(&mut self, a: &str, b: &str, score: f64) {
        self.scores.insert(Self::key(a, b), score.clamp(0.0, 1.0));
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}

impl AgreementScorer for PairwiseTable {
    fn name(&self) -> &str {
        "table"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.scores.get(&Self::key(a, b)).copied().unwrap_or(0.0)
    }
}
