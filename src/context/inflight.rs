//! Per-conversation in-flight markers for compaction

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of conversations currently being compacted
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    active: Arc<DashMap<String, DateTime<Utc>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `conversation_id` as compacting.
    ///
    /// Returns `None` if a compaction is already in flight. The marker is
    /// released when the returned guard is dropped.
    pub fn try_acquire(&self, conversation_id: &str) -> Option<CompactionGuard> {
        match self.active.entry(conversation_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(CompactionGuard {
                    active: self.active.clone(),
                    conversation_id: conversation_id.to_string(),
                })
            }
        }
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.active.contains_key(conversation_id)
    }

    /// When the in-flight compaction for `conversation_id` started
    pub fn started_at(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        self.active.get(conversation_id).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Scoped ownership of a conversation's compaction slot
pub struct CompactionGuard {
    active: Arc<DashMap<String, DateTime<Utc>>>,
    conversation_id: String,
}

impl CompactionGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for CompactionGuard {
    fn drop(&mut self) {
        self.active.remove(&self.conversation_id);
    }
}
