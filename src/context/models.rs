//! Data models for conversation compaction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Message content: plain text or a list of provider content parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl MessageContent {
    /// Flatten the content to plain text, joining the text of every part
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    Value::Object(obj) => obj
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn char_len(&self) -> usize {
        match self {
            MessageContent::Text(text) => text.chars().count(),
            MessageContent::Parts(parts) => Value::Array(parts.clone()).to_string().chars().count(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A chat message. Provider-specific fields are carried in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn text(&self) -> String {
        self.content.text()
    }

    /// Replace the message text, keeping the part structure when the content
    /// is a list whose first part is an object.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        match &mut self.content {
            MessageContent::Parts(parts) => match parts.first_mut() {
                Some(Value::Object(first)) => {
                    first.insert("text".to_string(), Value::String(text));
                }
                _ => self.content = MessageContent::Text(text),
            },
            MessageContent::Text(_) => self.content = MessageContent::Text(text),
        }
        self
    }
}

/// Rough token estimate (~4 characters per token).
///
/// Only used for logging and for manual compactions where the host has not
/// reported a prompt token count.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages.iter().map(|m| m.content.char_len()).sum();
    (chars / 4) as u64
}

/// Resolved provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelTarget {
    pub provider: String,
    pub model: String,
}

impl ModelTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ModelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Optional provider/model override. `None` on a field means "defer to the
/// next layer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverride {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ModelOverride {
    pub fn new(provider: Option<String>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    /// Layer `self` over `fallback`, field by field
    pub fn or(self, fallback: ModelOverride) -> ModelOverride {
        ModelOverride {
            provider: self.provider.or(fallback.provider),
            model: self.model.or(fallback.model),
        }
    }

    /// Fill any remaining gaps from the conversation's current target.
    /// Returns `None` when a field is still missing.
    pub fn resolve(self, current: Option<&ModelTarget>) -> Option<ModelTarget> {
        let provider = self
            .provider
            .or_else(|| current.map(|c| c.provider.clone()))?;
        let model = self.model.or_else(|| current.map(|c| c.model.clone()))?;
        Some(ModelTarget { provider, model })
    }
}

/// Latest token-usage observation for a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationUsage {
    pub target: ModelTarget,
    pub prompt_tokens: u64,
    pub context_limit: u64,
    pub last_updated: DateTime<Utc>,
}

impl ConversationUsage {
    pub fn usage_fraction(&self) -> f64 {
        if self.context_limit == 0 {
            return 0.0;
        }
        self.prompt_tokens as f64 / self.context_limit as f64
    }
}

/// Effective context window for a provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimit {
    pub provider: String,
    pub model: String,
    pub context_tokens: u64,
}

/// Outcome of one successful compaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionResult {
    pub summary_text: String,
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: u64,
    pub messages: Vec<Message>,
}
