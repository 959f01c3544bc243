//! Post-compaction history construction

use super::models::Message;

/// Recent non-system messages kept verbatim after compaction
pub const DEFAULT_RETAIN_RECENT: usize = 2;

pub const SUMMARY_PREFIX: &str = "[Context: Previous conversation summary]";

/// Builds the compacted message list:
/// leading system messages, the summary, an optional notice, then the most
/// recent non-system messages.
#[derive(Debug, Clone)]
pub struct HistoryRewriter {
    retain_recent: usize,
}

impl Default for HistoryRewriter {
    fn default() -> Self {
        Self {
            retain_recent: DEFAULT_RETAIN_RECENT,
        }
    }
}

impl HistoryRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retain_recent(mut self, retain_recent: usize) -> Self {
        self.retain_recent = retain_recent;
        self
    }

    pub fn rewrite(&self, messages: &[Message], summary_text: &str, notify_user: bool) -> Vec<Message> {
        let leading_system: Vec<&Message> =
            messages.iter().take_while(|m| m.is_system()).collect();

        let non_system: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        let recent = &non_system[non_system.len().saturating_sub(self.retain_recent)..];
        let summarized = non_system.len() - recent.len();

        let mut rewritten = Vec::with_capacity(leading_system.len() + recent.len() + 2);
        rewritten.extend(leading_system.into_iter().cloned());
        rewritten.push(summary_message(summary_text));
        if notify_user {
            rewritten.push(notification_message(summarized));
        }
        rewritten.extend(recent.iter().map(|m| (*m).clone()));
        rewritten
    }
}

pub fn summary_message(summary_text: &str) -> Message {
    Message::assistant(format!("{}\n\n{}", SUMMARY_PREFIX, summary_text))
}

pub fn notification_message(summarized: usize) -> Message {
    Message::assistant(format!(
        "Conversation history was compacted to stay within the model's context window: \
        {} earlier message{} replaced by a summary.",
        summarized,
        if summarized == 1 { " was" } else { "s were" }
    ))
}
