//! Corpus write path: extracted content → chunks → vectors → store.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::chunker::{Chunker, ChunkerError};
use super::embedding::{check_dimensions, EmbeddingError, SharedEmbedder};
use super::store::{SharedCorpusStore, StorageError};
use super::types::{Chunk, ExtractedContent, RaceId, SourceId};

/// Error type for corpus build operations.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for corpus build operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Outcome of ingesting one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source_id: SourceId,
    pub race_id: RaceId,
    /// Chunks produced by the chunker.
    pub chunks_produced: usize,
    /// Chunks actually stored.
    pub chunks_written: usize,
    /// Chunks dropped as duplicates.
    pub chunks_skipped: usize,
    /// Chunks removed first when replacing a superseded source.
    pub chunks_replaced: usize,
}

/// Outcome of ingesting many sources; one failure never aborts the rest.
#[derive(Debug, Default)]
pub struct BatchIngestReport {
    pub ingested: Vec<IngestReport>,
    pub failed: Vec<(SourceId, CorpusError)>,
}

impl BatchIngestReport {
    pub fn chunks_written(&self) -> usize {
        self.ingested.iter().map(|r| r.chunks_written).sum()
    }
}

/// Drives chunking, embedding and storage for extracted content.
pub struct CorpusBuilder {
    chunker: Chunker,
    embedder: SharedEmbedder,
    store: SharedCorpusStore,
}

impl CorpusBuilder {
    /// Create a builder; the embedder must produce the store's version.
    pub fn new(
        chunker: Chunker,
        embedder: SharedEmbedder,
        store: SharedCorpusStore,
    ) -> CorpusResult<Self> {
        let embedder_version = embedder.version();
        if &embedder_version != store.version() {
            return Err(StorageError::VersionMismatch {
                expected: store.version().clone(),
                actual: embedder_version,
                subject: "embedder".to_string(),
            }
            .into());
        }
        Ok(Self {
            chunker,
            embedder,
            store,
        })
    }

    pub fn store(&self) -> &SharedCorpusStore {
        &self.store
    }

    /// Chunk, embed and store one source.
    pub async fn ingest(&self, content: &ExtractedContent) -> CorpusResult<IngestReport> {
        let texts = self.chunker.chunk(&content.text);
        let mut report = IngestReport {
            source_id: content.source_id.clone(),
            race_id: content.race_id.clone(),
            chunks_produced: texts.len(),
            ..IngestReport::default()
        };
        if texts.is_empty() {
            return Ok(report);
        }

        let version = self.embedder.version();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                texts.len()
            ))
            .into());
        }

        let mut chunks = Vec::with_capacity(texts.len());
        for (position, (text, vector)) in texts.into_iter().zip(vectors).enumerate() {
            check_dimensions(&version, &vector)?;
            let position_index = position as u32;
            chunks.push(Chunk {
                chunk_id: Chunk::chunk_id_for(&content.source_id, position_index),
                source_id: content.source_id.clone(),
                race_id: content.race_id.clone(),
                candidate_ref: content.candidate_ref.clone(),
                issue_tags: content.issue_tags.clone(),
                text,
                vector,
                position_index,
                embedding_version: version.clone(),
            });
        }

        report.chunks_written = self.store.upsert(chunks)?;
        report.chunks_skipped = report.chunks_produced - report.chunks_written;

        info!(
            race_id = %report.race_id,
            source_id = %report.source_id,
            produced = report.chunks_produced,
            written = report.chunks_written,
            skipped = report.chunks_skipped,
            "Ingested source"
        );
        Ok(report)
    }

    /// Drop a superseded source's chunks, then ingest the new content.
    pub async fn replace(&self, content: &ExtractedContent) -> CorpusResult<IngestReport> {
        let removed = self
            .store
            .delete_source(&content.race_id, &content.source_id)?;
        let mut report = self.ingest(content).await?;
        report.chunks_replaced = removed;
        Ok(report)
    }

    /// Ingest many sources in order, collecting per-source failures.
    pub async fn ingest_all(&self, contents: &[ExtractedContent]) -> BatchIngestReport {
        let mut batch = BatchIngestReport::default();
        for content in contents {
            match self.ingest(content).await {
                Ok(report) => batch.ingested.push(report),
                Err(e) => {
                    warn!(
                        race_id = %content.race_id,
                        source_id = %content.source_id,
                        error = %e,
                        "Source ingest failed"
                    );
                    batch.failed.push((content.source_id.clone(), e));
                }
            }
        }
        batch
    }
}
