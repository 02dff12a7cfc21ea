//! In-memory corpus store with filtered cosine search.
//!
//! Locking layout:
//! - `chunks`: one table-level `RwLock`. `search` and `stats` take the read
//!   side only; writers hold the write side just long enough to append.
//! - `write_locks`: one mutex per `(race_id, source_id)`. Concurrent upserts
//!   for the same source serialize on it so the dedup check and the insert
//!   see a consistent view of that source.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::similarity::{similarity_score, text_similarity};
use super::types::{Chunk, CorpusStats, EmbeddingVersion, RaceId, RetrievalResult, SearchFilter, SourceId};

/// Default textual similarity at which two chunks of one source are the same.
pub const DEFAULT_DEDUP_SIMILARITY: f64 = 0.97;

/// Error type for corpus store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Embedding version mismatch for {subject}: store is {expected}, got {actual}")]
    VersionMismatch {
        expected: EmbeddingVersion,
        actual: EmbeddingVersion,
        subject: String,
    },

    #[error("Vector for {chunk_id} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Query vector has {actual} dimensions, expected {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for corpus store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared reference to CorpusStore.
pub type SharedCorpusStore = Arc<CorpusStore>;

/// Serializable image of a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub version: EmbeddingVersion,
    pub chunks: Vec<Chunk>,
}

/// Chunk table bound to a single embedding version.
pub struct CorpusStore {
    version: EmbeddingVersion,
    dedup_similarity: f64,
    chunks: RwLock<Vec<Chunk>>,
    write_locks: Mutex<HashMap<(RaceId, SourceId), Arc<Mutex<()>>>>,
}

impl CorpusStore {
    /// Create an empty store for one embedding version.
    pub fn new(version: EmbeddingVersion) -> Self {
        Self::with_dedup_similarity(version, DEFAULT_DEDUP_SIMILARITY)
    }

    pub fn with_dedup_similarity(version: EmbeddingVersion, dedup_similarity: f64) -> Self {
        Self {
            version,
            dedup_similarity,
            chunks: RwLock::new(Vec::new()),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedCorpusStore {
        Arc::new(self)
    }

    /// Active embedding version.
    pub fn version(&self) -> &EmbeddingVersion {
        &self.version
    }

    pub fn dedup_similarity(&self) -> f64 {
        self.dedup_similarity
    }

    /// Total chunk count across all races.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Write a batch of chunks, returning how many were stored.
    ///
    /// The whole batch is rejected when any chunk carries a foreign
    /// embedding version or a vector of the wrong length. Chunks that
    /// duplicate an existing chunk of the same source (same id, or text
    /// similarity at or above the dedup threshold) are skipped; the first
    /// write wins.
    pub fn upsert(&self, chunks: Vec<Chunk>) -> StorageResult<usize> {
        for chunk in &chunks {
            self.validate(chunk)?;
        }

        // Group by source, preserving first-seen order.
        let mut order: Vec<(RaceId, SourceId)> = Vec::new();
        let mut groups: HashMap<(RaceId, SourceId), Vec<Chunk>> = HashMap::new();
        for chunk in chunks {
            let key = chunk.source_key();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(chunk);
        }

        let mut written = 0;
        for key in order {
            let batch = groups.remove(&key).unwrap_or_default();
            written += self.upsert_source(&key, batch)?;
        }
        Ok(written)
    }

    fn upsert_source(&self, key: &(RaceId, SourceId), batch: Vec<Chunk>) -> StorageResult<usize> {
        let source_lock = self.source_lock(key)?;
        let _guard = source_lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let (mut known_ids, mut known_texts): (BTreeSet<String>, Vec<String>) = {
            let table = self.read()?;
            let existing: Vec<&Chunk> = table
                .iter()
                .filter(|c| c.race_id == key.0 && c.source_id == key.1)
                .collect();
            (
                existing.iter().map(|c| c.chunk_id.clone()).collect(),
                existing.iter().map(|c| c.text.clone()).collect(),
            )
        };

        let mut accepted = Vec::with_capacity(batch.len());
        let mut skipped = 0usize;
        for chunk in batch {
            let duplicate = known_ids.contains(&chunk.chunk_id)
                || known_texts
                    .iter()
                    .any(|t| text_similarity(t, &chunk.text) >= self.dedup_similarity);
            if duplicate {
                skipped += 1;
                continue;
            }
            known_ids.insert(chunk.chunk_id.clone());
            known_texts.push(chunk.text.clone());
            accepted.push(chunk);
        }

        let written = accepted.len();
        if written > 0 {
            let mut table = self.chunks.write().map_err(|_| StorageError::LockPoisoned)?;
            table.extend(accepted);
        }

        debug!(
            race_id = %key.0,
            source_id = %key.1,
            written,
            skipped,
            "Upserted source chunks"
        );
        Ok(written)
    }

    /// Nearest-neighbor search restricted by `filter`.
    ///
    /// Results are ordered by descending score, then earliest position,
    /// then chunk id. Only chunks of the active embedding version are
    /// considered. An empty result means insufficient evidence.
    pub fn search(
        &self,
        query_vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
        min_score: f32,
    ) -> StorageResult<Vec<RetrievalResult>> {
        if query_vector.len() != self.version.dimensions {
            return Err(StorageError::QueryDimensionMismatch {
                expected: self.version.dimensions,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let table = self.read()?;
        let mut hits: Vec<RetrievalResult> = table
            .iter()
            .filter(|c| c.embedding_version == self.version && filter.matches(c))
            .filter_map(|c| {
                let score = similarity_score(query_vector, &c.vector);
                (score >= min_score).then(|| RetrievalResult {
                    chunk_id: c.chunk_id.clone(),
                    source_id: c.source_id.clone(),
                    score,
                    text: c.text.clone(),
                    position_index: c.position_index,
                })
            })
            .collect();
        drop(table);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position_index.cmp(&b.position_index))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Per-race summary.
    pub fn stats(&self, race_id: &str) -> StorageResult<CorpusStats> {
        let table = self.read()?;
        let mut stats = CorpusStats {
            race_id: race_id.to_string(),
            ..CorpusStats::default()
        };
        let mut sources = BTreeSet::new();
        for chunk in table.iter().filter(|c| c.race_id == race_id) {
            stats.chunk_count += 1;
            sources.insert(chunk.source_id.as_str());
            if let Some(ref candidate) = chunk.candidate_ref {
                *stats
                    .coverage_per_candidate
                    .entry(candidate.clone())
                    .or_insert(0) += 1;
            }
        }
        stats.distinct_sources = sources.len();
        Ok(stats)
    }

    /// Remove every chunk of a superseded source, returning how many went.
    pub fn delete_source(&self, race_id: &str, source_id: &str) -> StorageResult<usize> {
        let key = (race_id.to_string(), source_id.to_string());
        let source_lock = self.source_lock(&key)?;
        let removed = {
            let _guard = source_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
            let mut table = self.chunks.write().map_err(|_| StorageError::LockPoisoned)?;
            let before = table.len();
            table.retain(|c| !(c.race_id == race_id && c.source_id == source_id));
            before - table.len()
        };
        drop(source_lock);
        self.release_source_lock(&key)?;

        info!(race_id, source_id, removed, "Deleted source chunks");
        Ok(removed)
    }

    /// Copy the current table for persistence.
    pub fn snapshot(&self) -> StorageResult<CorpusSnapshot> {
        Ok(CorpusSnapshot {
            version: self.version.clone(),
            chunks: self.read()?.clone(),
        })
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Fails when the snapshot or any chunk in it was written under a
    /// different embedding version than `expected`.
    pub fn from_snapshot(
        snapshot: CorpusSnapshot,
        expected: &EmbeddingVersion,
        dedup_similarity: f64,
    ) -> StorageResult<Self> {
        if &snapshot.version != expected {
            return Err(StorageError::VersionMismatch {
                expected: expected.clone(),
                actual: snapshot.version,
                subject: "snapshot".to_string(),
            });
        }
        let store = Self::with_dedup_similarity(snapshot.version, dedup_similarity);
        for chunk in &snapshot.chunks {
            store.validate(chunk)?;
        }
        *store.chunks.write().map_err(|_| StorageError::LockPoisoned)? = snapshot.chunks;
        Ok(store)
    }

    fn validate(&self, chunk: &Chunk) -> StorageResult<()> {
        if chunk.embedding_version != self.version {
            return Err(StorageError::VersionMismatch {
                expected: self.version.clone(),
                actual: chunk.embedding_version.clone(),
                subject: chunk.chunk_id.clone(),
            });
        }
        if chunk.vector.len() != self.version.dimensions {
            return Err(StorageError::DimensionMismatch {
                chunk_id: chunk.chunk_id.clone(),
                expected: self.version.dimensions,
                actual: chunk.vector.len(),
            });
        }
        Ok(())
    }

    fn source_lock(&self, key: &(RaceId, SourceId)) -> StorageResult<Arc<Mutex<()>>> {
        let mut locks = self.write_locks.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Forget a deleted source's write lock unless a writer still holds it.
    fn release_source_lock(&self, key: &(RaceId, SourceId)) -> StorageResult<()> {
        let mut locks = self.write_locks.lock().map_err(|_| StorageError::LockPoisoned)?;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
        Ok(())
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> StorageResult<usize> {
        Ok(self.write_locks.lock().map_err(|_| StorageError::LockPoisoned)?.len())
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Vec<Chunk>>> {
        self.chunks.read().map_err(|_| StorageError::LockPoisoned)
    }
}
