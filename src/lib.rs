//! Context compaction for long-running LLM chat servers
//!
//! Keeps conversations inside their model's context window by summarizing
//! older history once token usage crosses a configured threshold.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod providers;

pub use config::{CompactionConfig, ConfigStore, ConfigUpdate, ServerSettings};
pub use context::{CompactionEngine, CompactionOutcome, CompletionObservation, Message};
pub use error::{CompactionError, Result};
