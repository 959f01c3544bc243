//! Per-conversation token usage tracking

use super::limits::ModelLimitResolver;
use super::models::{ConversationUsage, ModelTarget};
use crate::metrics::METRICS;
use chrono::Utc;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::sync::Arc;
use tracing::debug;

/// Keeps the latest usage observation per conversation.
///
/// Capacity-bounded; the least recently touched conversations are evicted.
pub struct UsageMonitor {
    limits: Arc<ModelLimitResolver>,
    entries: Cache<String, ConversationUsage>,
}

impl UsageMonitor {
    pub fn new(limits: Arc<ModelLimitResolver>, capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { limits, entries }
    }

    /// Record the prompt token count of a completion, replacing any prior entry
    pub async fn record(
        &self,
        conversation_id: &str,
        provider: &str,
        model: &str,
        prompt_tokens: u64,
    ) -> ConversationUsage {
        let context_limit = self.limits.resolve(provider, model).await;
        let usage = ConversationUsage {
            target: ModelTarget::new(provider, model),
            prompt_tokens,
            context_limit,
            last_updated: Utc::now(),
        };

        debug!(
            "Usage for {}: {}/{} tokens ({:.1}%)",
            conversation_id,
            prompt_tokens,
            context_limit,
            usage.usage_fraction() * 100.0
        );
        METRICS.usage_fraction.observe(usage.usage_fraction());

        self.entries
            .insert(conversation_id.to_string(), usage.clone())
            .await;
        METRICS.tracked_conversations.set(self.entries.entry_count() as i64);
        usage
    }

    /// Fraction of the context window used by the latest observation, 0.0 if none
    pub async fn usage_fraction(&self, conversation_id: &str) -> f64 {
        self.get(conversation_id)
            .await
            .map(|usage| usage.usage_fraction())
            .unwrap_or(0.0)
    }

    pub async fn get(&self, conversation_id: &str) -> Option<ConversationUsage> {
        self.entries.get(conversation_id).await
    }

    /// Drop the observation for a conversation (after a successful compaction)
    pub async fn clear(&self, conversation_id: &str) {
        self.entries.invalidate(conversation_id).await;
    }

    /// Snapshot of all tracked conversations
    pub fn snapshot(&self) -> Vec<(String, ConversationUsage)> {
        self.entries
            .iter()
            .map(|(id, usage)| (id.as_ref().clone(), usage))
            .collect()
    }

    /// Apply pending evictions so counts are exact
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
        METRICS.tracked_conversations.set(self.entries.entry_count() as i64);
    }

    pub fn tracked(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticModelCatalog;

    fn monitor(capacity: u64) -> UsageMonitor {
        let catalog = StaticModelCatalog::new().with_model("openai", "gpt-4o", 1000);
        UsageMonitor::new(Arc::new(ModelLimitResolver::new(Arc::new(catalog))), capacity)
    }

    #[tokio::test]
    async fn test_no_entry_is_zero() {
        let monitor = monitor(10);
        assert_eq!(monitor.usage_fraction("unknown").await, 0.0);
    }

    #[tokio::test]
    async fn test_record_overwrites() {
        let monitor = monitor(10);
        monitor.record("c1", "openai", "gpt-4o", 500).await;
        assert_eq!(monitor.usage_fraction("c1").await, 0.5);

        let usage = monitor.record("c1", "openai", "gpt-4o", 820).await;
        assert_eq!(usage.context_limit, 1000);
        assert_eq!(monitor.usage_fraction("c1").await, 0.82);
    }

    #[tokio::test]
    async fn test_fallback_limit_applied() {
        let monitor = monitor(10);
        let usage = monitor.record("c2", "custom", "x", 2048).await;
        assert_eq!(usage.context_limit, 4096);
        assert_eq!(monitor.usage_fraction("c2").await, 0.5);
    }

    #[tokio::test]
    async fn test_clear() {
        let monitor = monitor(10);
        monitor.record("c1", "openai", "gpt-4o", 900).await;
        monitor.clear("c1").await;
        assert!(monitor.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let monitor = monitor(5);
        for i in 0..50 {
            monitor.record(&format!("conv-{}", i), "openai", "gpt-4o", 10).await;
        }
        monitor.sync().await;
        assert!(monitor.tracked() <= 5);
    }
}
