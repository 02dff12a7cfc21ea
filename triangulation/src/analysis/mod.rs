//! Multi-provider stance analysis.
//!
//! Every configured provider receives the same prompt built from the
//! retrieved context. Each reply is parsed into a [`StanceClaim`]; failures
//! of any kind are dropped and reported, never raised.

pub mod prompt;
pub mod provider;
pub mod runner;
pub mod types;

pub use prompt::{build_prompt, parse_stance_response};
pub use provider::{AnalysisPrompt, ProviderClient, ProviderError, ProviderResult, SharedProvider};
pub use runner::{AnalysisReport, AnalysisRunner, DropReason, DroppedProvider};
pub use types::StanceClaim;
