//! Retrieval corpus: chunking, embedding, storage, and context assembly.
//!
//! Write path: `ExtractedContent` → [`Chunker`] → [`EmbeddingProvider`] →
//! [`CorpusStore`], driven by [`CorpusBuilder`]. Read path:
//! [`RetrievalAssembler`] embeds a candidate + issue query and packs the
//! best matching chunks into a [`RetrievedContext`].

pub mod builder;
pub mod chunker;
pub mod embedding;
pub mod persistence;
pub mod retrieval;
pub mod similarity;
pub mod store;
pub mod types;

pub use builder::{BatchIngestReport, CorpusBuilder, CorpusError, CorpusResult, IngestReport};
pub use chunker::{chunk, Chunker, ChunkerError};
pub use embedding::{
    EmbeddingError, EmbeddingProvider, EmbeddingResult, HashingEmbedder, SharedEmbedder,
};
pub use persistence::{load_corpus, load_or_create_corpus, save_corpus};
pub use retrieval::{RetrievalAssembler, RetrievalQuery, RetrievedContext};
pub use store::{CorpusSnapshot, CorpusStore, SharedCorpusStore, StorageError, StorageResult};
pub use types::{
    Chunk, ChunkId, CorpusStats, EmbeddingVersion, ExtractedContent, RaceId, RetrievalResult,
    SearchFilter, SourceId,
};
