//! Conversation compaction
//!
//! Tracks per-conversation token usage and, once a conversation crosses the
//! configured fraction of its model's context window, replaces the bulk of
//! its history with a generated summary while keeping the most recent turns.

pub mod boundary;
pub mod engine;
pub mod inflight;
pub mod limits;
pub mod models;
pub mod rewriter;
pub mod summarizer;
pub mod threshold;
pub mod usage;

pub use boundary::{BoundaryStore, CompactionBoundary};
pub use engine::{
    CompactionEngine, CompactionOutcome, CompletionObservation, ConversationStatus,
    ManualCompaction, RequestOutcome, StatusReport, Trigger,
};
pub use inflight::{CompactionGuard, InFlightRegistry};
pub use limits::{fallback_limit, ModelLimitResolver, DEFAULT_CONTEXT_LIMIT};
pub use models::{
    CompactionResult, ConversationUsage, Message, MessageContent, ModelLimit, ModelOverride,
    ModelTarget, Role,
};
pub use rewriter::HistoryRewriter;
pub use summarizer::Summarizer;
pub use threshold::ThresholdEvaluator;
pub use usage::UsageMonitor;
