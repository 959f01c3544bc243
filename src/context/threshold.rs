//! Threshold evaluation

use super::usage::UsageMonitor;
use crate::config::{CompactionConfig, ConfigStore};
use std::sync::Arc;

/// Decides whether a conversation has crossed the compaction threshold.
///
/// Stateless: every call reads the current policy snapshot and the latest
/// usage observation.
#[derive(Clone)]
pub struct ThresholdEvaluator {
    config: Arc<ConfigStore>,
    usage: Arc<UsageMonitor>,
}

impl ThresholdEvaluator {
    pub fn new(config: Arc<ConfigStore>, usage: Arc<UsageMonitor>) -> Self {
        Self { config, usage }
    }

    pub async fn should_compact(&self, conversation_id: &str) -> bool {
        let config = self.config.get();
        self.should_compact_with(&config, conversation_id).await
    }

    /// Same decision against a snapshot the caller already holds
    pub async fn should_compact_with(&self, config: &CompactionConfig, conversation_id: &str) -> bool {
        if !config.enabled {
            return false;
        }
        let fraction = self.usage.usage_fraction(conversation_id).await;
        config.is_over_threshold(fraction)
    }
}
