//! Consensus arbitration.
//!
//! Claims are compared pairwise by an injected [`AgreementScorer`], grouped
//! with union-find, and reduced to one [`IssueStance`] whose confidence
//! reflects how many responding providers landed in the majority group.

pub mod agreement;
pub mod arbiter;
pub mod clustering;
pub mod types;

pub use agreement::{AgreementScorer, LexicalAgreement, PairwiseTable, VectorAgreement};
pub use arbiter::{confidence_level, ArbitrationDetail, ConsensusArbiter};
pub use clustering::{agreement_groups, PairScore, UnionFind};
pub use types::{ConfidenceLevel, IssueStance};
