//! Candidate Stance Triangulation.
//!
//! This library provides:
//! - A retrieval corpus that chunks, embeds, stores and searches source text
//! - Parallel stance analysis across several independent language models
//! - Consensus arbitration that reduces their claims to one confidence-rated
//!   stance while keeping dissenting views
//!
//! # Data flow
//!
//! ```text
//! write path:  ExtractedContent → Chunker → EmbeddingProvider → CorpusStore
//! read path:   RetrievalAssembler → AnalysisRunner (fan-out) → ConsensusArbiter → IssueStance
//! ```
//!
//! No network I/O happens here. Provider and embedding clients plug in
//! through [`analysis::ProviderClient`] and [`corpus::EmbeddingProvider`].
//!
//! # Usage
//!
//! ```no_run
//! use triangulation::{
//!     config::TriangulationConfig,
//!     corpus::{Chunker, CorpusBuilder, CorpusStore, EmbeddingProvider, ExtractedContent, HashingEmbedder},
//!     pipeline::StancePipeline,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TriangulationConfig::default();
//! let embedder = HashingEmbedder::default().shared();
//! let store = CorpusStore::new(embedder.version()).shared();
//!
//! let builder = CorpusBuilder::new(Chunker::from_config(&config.chunking)?, embedder.clone(), store.clone())?;
//! builder
//!     .ingest(&ExtractedContent::new("src-1", "race-1", "Jane Doe supports expanded Medicaid.").with_candidate("jane-doe"))
//!     .await?;
//!
//! let pipeline = StancePipeline::from_config(&config, embedder, store, Vec::new());
//! let report = pipeline
//!     .run_candidate("race-1", "Jane Doe", Some("jane-doe"), &["Healthcare".to_string()])
//!     .await;
//! assert_eq!(report.issues.len(), 1);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod config;
pub mod consensus;
pub mod corpus;
pub mod pipeline;

pub use analysis::{AnalysisReport, AnalysisRunner, ProviderClient, ProviderError, StanceClaim};
pub use config::{ConfigError, TriangulationConfig};
pub use consensus::{AgreementScorer, ConfidenceLevel, ConsensusArbiter, IssueStance};
pub use corpus::{
    Chunk, CorpusBuilder, CorpusError, CorpusStore, EmbeddingProvider, EmbeddingVersion,
    ExtractedContent, RetrievalAssembler, RetrievalQuery, RetrievedContext, StorageError,
};
pub use pipeline::{CandidateReport, InsufficientEvidencePolicy, IssueRun, ScorerSource, StancePipeline};
