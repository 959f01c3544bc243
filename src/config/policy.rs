//! Compaction policy and partial updates

use crate::context::models::ModelOverride;
use crate::error::{CompactionError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize this conversation so it can replace the \
full history. Preserve key facts, decisions, constraints, names, numbers and code details, \
the user's goals and preferences, and any open questions or pending tasks. Write plain prose \
only. Do not call tools and do not continue the conversation.";

pub const DEFAULT_SIMPLE_PROMPT: &str = "Summarize this conversation concisely.";

/// Compaction policy persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Automatic compaction on/off (manual compaction always works)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Fraction of the context window that triggers compaction, in (0, 1]
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Summarization provider; `null` uses the conversation's current provider
    #[serde(default)]
    pub provider: Option<String>,

    /// Summarization model; `null` uses the conversation's current model
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_notify_user")]
    pub notify_user: bool,

    #[serde(default)]
    pub use_simple_prompt: bool,

    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,

    #[serde(default = "default_simple_prompt")]
    pub simple_prompt: String,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.8
}

fn default_notify_user() -> bool {
    true
}

fn default_summary_prompt() -> String {
    DEFAULT_SUMMARY_PROMPT.to_string()
}

fn default_simple_prompt() -> String {
    DEFAULT_SIMPLE_PROMPT.to_string()
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            threshold: default_threshold(),
            provider: None,
            model: None,
            notify_user: default_notify_user(),
            use_simple_prompt: false,
            summary_prompt: default_summary_prompt(),
            simple_prompt: default_simple_prompt(),
        }
    }
}

impl CompactionConfig {
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        if self.summary_prompt.trim().is_empty() {
            return Err(CompactionError::ConfigValidation(
                "summary_prompt cannot be empty".to_string(),
            ));
        }
        if self.simple_prompt.trim().is_empty() {
            return Err(CompactionError::ConfigValidation(
                "simple_prompt cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Prompt used for the next summarization
    pub fn active_prompt(&self) -> &str {
        if self.use_simple_prompt {
            &self.simple_prompt
        } else {
            &self.summary_prompt
        }
    }

    /// Configured provider/model as an override layer
    pub fn model_override(&self) -> ModelOverride {
        ModelOverride::new(self.provider.clone(), self.model.clone())
    }

    /// True when `fraction` has reached the configured threshold
    pub fn is_over_threshold(&self, fraction: f64) -> bool {
        self.enabled && fraction >= self.threshold
    }

    /// Apply a partial update, returning the merged configuration
    pub fn merged(&self, update: ConfigUpdate) -> CompactionConfig {
        let mut next = self.clone();
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(threshold) = update.threshold {
            next.threshold = threshold;
        }
        if let Some(provider) = update.provider {
            next.provider = provider;
        }
        if let Some(model) = update.model {
            next.model = model;
        }
        if let Some(notify_user) = update.notify_user {
            next.notify_user = notify_user;
        }
        if let Some(use_simple_prompt) = update.use_simple_prompt {
            next.use_simple_prompt = use_simple_prompt;
        }
        if let Some(summary_prompt) = update.summary_prompt {
            next.summary_prompt = summary_prompt;
        }
        if let Some(simple_prompt) = update.simple_prompt {
            next.simple_prompt = simple_prompt;
        }
        next
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
        return Err(CompactionError::ConfigValidation(format!(
            "threshold must be in (0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

/// Partial configuration update. Unknown fields are ignored.
///
/// `provider` and `model` distinguish an absent field (keep) from an explicit
/// `null` (reset to "use current").
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub provider: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub model: Option<Option<String>>,
    #[serde(default)]
    pub notify_user: Option<bool>,
    #[serde(default)]
    pub use_simple_prompt: Option<bool>,
    #[serde(default)]
    pub summary_prompt: Option<String>,
    #[serde(default)]
    pub simple_prompt: Option<String>,
}

fn explicit_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ConfigUpdate {
    /// Parse an untyped JSON body, reporting malformed fields as validation errors
    pub fn from_json(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CompactionError::ConfigValidation(
                "configuration update must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| CompactionError::ConfigValidation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = CompactionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.threshold, 0.8);
        assert!(config.notify_user);
        assert!(!config.use_simple_prompt);
        assert!(config.provider.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: CompactionConfig =
            serde_json::from_value(json!({"threshold": 0.5, "model": "qwen2.5:7b"})).unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.model.as_deref(), Some("qwen2.5:7b"));
        assert!(config.enabled);
        assert_eq!(config.simple_prompt, DEFAULT_SIMPLE_PROMPT);
    }

    #[test]
    fn test_threshold_bounds() {
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            let config = CompactionConfig {
                threshold: bad,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} should be rejected", bad);
        }
        let config = CompactionConfig {
            threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_active_prompt() {
        let mut config = CompactionConfig::default();
        assert_eq!(config.active_prompt(), DEFAULT_SUMMARY_PROMPT);
        config.use_simple_prompt = true;
        assert_eq!(config.active_prompt(), DEFAULT_SIMPLE_PROMPT);
    }

    #[test]
    fn test_update_null_vs_absent() {
        let base = CompactionConfig {
            provider: Some("ollama".into()),
            model: Some("qwen2.5:7b".into()),
            ..Default::default()
        };

        let keep = ConfigUpdate::from_json(json!({"threshold": 0.9})).unwrap();
        let merged = base.merged(keep);
        assert_eq!(merged.provider.as_deref(), Some("ollama"));
        assert_eq!(merged.threshold, 0.9);

        let reset = ConfigUpdate::from_json(json!({"provider": null})).unwrap();
        let merged = base.merged(reset);
        assert!(merged.provider.is_none());
        assert_eq!(merged.model.as_deref(), Some("qwen2.5:7b"));
    }

    #[test]
    fn test_update_ignores_unknown_fields() {
        let update = ConfigUpdate::from_json(json!({"notify_user": false, "future_flag": 1})).unwrap();
        assert_eq!(update.notify_user, Some(false));
    }

    #[test]
    fn test_update_rejects_malformed_fields() {
        tokio_test::assert_err!(ConfigUpdate::from_json(json!({"threshold": "high"})));
        tokio_test::assert_err!(ConfigUpdate::from_json(json!([1, 2])));
        tokio_test::assert_ok!(ConfigUpdate::from_json(json!({})));
    }

    #[test]
    fn test_is_over_threshold_inclusive() {
        let config = CompactionConfig::default();
        assert!(config.is_over_threshold(0.8));
        assert!(config.is_over_threshold(0.82));
        assert!(!config.is_over_threshold(0.79));

        let disabled = CompactionConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!disabled.is_over_threshold(1.0));
    }
}
