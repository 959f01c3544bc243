//! Compaction boundaries for clients that resend their full history

use super::models::Message;
use super::rewriter::summary_message;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::debug;

/// The compacted view of a conversation after `/compact` or a manual compaction.
///
/// `covered` counts the client messages the view replaces; anything the client
/// sent after them is appended unchanged.
#[derive(Debug, Clone)]
pub struct CompactionBoundary {
    pub covered: usize,
    pub summary_text: String,
    pub messages: Vec<Message>,
    pub compacted_at: DateTime<Utc>,
}

impl CompactionBoundary {
    pub fn new(covered: usize, summary_text: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            covered,
            summary_text: summary_text.into(),
            messages,
            compacted_at: Utc::now(),
        }
    }

    /// Replace the covered prefix of a resent history with the compacted view.
    ///
    /// A history shorter than the covered prefix no longer lines up with the
    /// boundary; it collapses to leading system messages, the summary and the
    /// latest message.
    pub fn apply(&self, messages: &[Message]) -> Vec<Message> {
        if messages.len() >= self.covered {
            let mut applied = Vec::with_capacity(self.messages.len() + messages.len() - self.covered);
            applied.extend(self.messages.iter().cloned());
            applied.extend(messages[self.covered..].iter().cloned());
            return applied;
        }

        let mut applied: Vec<Message> = self
            .messages
            .iter()
            .take_while(|m| m.is_system())
            .cloned()
            .collect();
        applied.push(summary_message(&self.summary_text));
        applied.extend(messages.last().cloned());
        applied
    }
}

/// Latest boundary per conversation, capacity-bounded
pub struct BoundaryStore {
    entries: Cache<String, CompactionBoundary>,
}

impl BoundaryStore {
    pub fn new(capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    pub async fn set(&self, conversation_id: &str, boundary: CompactionBoundary) {
        debug!(
            "Boundary for {}: {} messages -> {}",
            conversation_id,
            boundary.covered,
            boundary.messages.len()
        );
        self.entries
            .insert(conversation_id.to_string(), boundary)
            .await;
    }

    pub async fn get(&self, conversation_id: &str) -> Option<CompactionBoundary> {
        self.entries.get(conversation_id).await
    }

    pub async fn clear(&self, conversation_id: &str) {
        self.entries.invalidate(conversation_id).await;
    }

    /// Apply the conversation's boundary, if any. `None` when there is none.
    pub async fn apply(&self, conversation_id: &str, messages: &[Message]) -> Option<Vec<Message>> {
        self.get(conversation_id)
            .await
            .map(|boundary| boundary.apply(messages))
    }
}
