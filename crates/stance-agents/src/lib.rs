//! Stance agents: vendor clients and command-line wiring for triangulation.
//!
//! The core `triangulation` crate does no network I/O. This crate supplies
//! the pieces that do:
//!
//! | Module      | Provides                                                    |
//! |-------------|-------------------------------------------------------------|
//! | `config`    | `AgentsConfig` (providers, embedding endpoint, pipeline)    |
//! | `providers` | OpenAI-compatible chat and Anthropic messages clients       |
//! | `embedding` | OpenAI-compatible `/embeddings` client, embedder selection  |
//! | `inputs`    | Extracted-content and issue-list readers                    |
//! | `report`    | Timestamped report file names for `analyze --output-dir`    |

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod embedding;
pub mod inputs;
pub mod providers;
pub mod report;

pub use config::{AgentsConfig, AgentsError, AgentsResult};
