//! LLM-based summarization of conversation history

use super::models::{Message, ModelOverride, ModelTarget};
use crate::config::CompactionConfig;
use crate::error::{CompactionError, Result};
use crate::metrics::METRICS;
use crate::providers::CompletionBackend;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Produces a summary of a message history through the host's completion call
#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Pick the summarization target: argument override, then configured
    /// override, then the conversation's current provider/model
    pub fn select_target(
        config: &CompactionConfig,
        override_target: ModelOverride,
        current: Option<&ModelTarget>,
    ) -> Result<ModelTarget> {
        override_target
            .or(config.model_override())
            .resolve(current)
            .ok_or(CompactionError::ModelUnresolved)
    }

    /// Summarize `messages` with the prompt selected by `config`
    pub async fn summarize(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
        target: &ModelTarget,
    ) -> Result<String> {
        let request = build_request(config.active_prompt(), messages);

        debug!(
            "Summarizing {} messages with {} (simple prompt: {})",
            messages.len(),
            target,
            config.use_simple_prompt
        );

        let started = Instant::now();
        let response = self.backend.complete(target, &request).await;
        METRICS
            .summarization_duration
            .observe(started.elapsed().as_secs_f64());

        let text = response.map_err(|e| {
            warn!("Summarization with {} failed: {}", target, e);
            CompactionError::SummarizationFailure(e.to_string())
        })?;

        let summary = text.trim();
        if summary.is_empty() {
            warn!("Summarization with {} returned an empty response", target);
            return Err(CompactionError::SummarizationFailure(
                "empty summary".to_string(),
            ));
        }

        Ok(summary.to_string())
    }
}

/// Prompt as the system instruction, the history as a transcript user turn
fn build_request(prompt: &str, messages: &[Message]) -> Vec<Message> {
    vec![
        Message::system(prompt),
        Message::user(format_transcript(messages)),
    ]
}

/// Render messages as `role: content` blocks separated by blank lines
pub fn format_transcript(messages: &[Message]) -> String {
    let mut output = String::new();
    for message in messages {
        let _ = write!(output, "{}: {}\n\n", message.role.as_str(), message.text());
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::BackendError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<(ModelTarget, Vec<Message>)>>,
    }

    impl RecordingBackend {
        fn replying(reply: std::result::Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(String::from).map_err(String::from),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        async fn complete(
            &self,
            target: &ModelTarget,
            messages: &[Message],
        ) -> std::result::Result<String, BackendError> {
            self.seen
                .lock()
                .unwrap()
                .push((target.clone(), messages.to_vec()));
            self.reply.clone().map_err(BackendError::ApiError)
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::system("Be helpful."),
            Message::user("What is Rust?"),
            Message::assistant("A systems language."),
        ]
    }

    #[tokio::test]
    async fn test_uses_summary_prompt_and_transcript() {
        let backend = RecordingBackend::replying(Ok("  Rust was discussed.  "));
        let summarizer = Summarizer::new(backend.clone());
        let config = CompactionConfig::default();
        let target = ModelTarget::new("openai", "gpt-4o");

        let summary = summarizer.summarize(&history(), &config, &target).await.unwrap();
        assert_eq!(summary, "Rust was discussed.");

        let seen = backend.seen.lock().unwrap();
        let (seen_target, request) = &seen[0];
        assert_eq!(seen_target, &target);
        assert_eq!(request[0].text(), config.summary_prompt);
        assert_eq!(
            request[1].text(),
            "system: Be helpful.\n\nuser: What is Rust?\n\nassistant: A systems language.\n\n"
        );
    }

    #[tokio::test]
    async fn test_simple_prompt_selected() {
        let backend = RecordingBackend::replying(Ok("ok"));
        let summarizer = Summarizer::new(backend.clone());
        let config = CompactionConfig {
            use_simple_prompt: true,
            ..Default::default()
        };
        summarizer
            .summarize(&history(), &config, &ModelTarget::new("p", "m"))
            .await
            .unwrap();
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].1[0].text(), config.simple_prompt);
    }

    #[tokio::test]
    async fn test_failure_and_empty_are_errors() {
        let config = CompactionConfig::default();
        let target = ModelTarget::new("p", "m");

        let failing = Summarizer::new(RecordingBackend::replying(Err("503")));
        let result = failing.summarize(&history(), &config, &target).await;
        assert!(matches!(result, Err(CompactionError::SummarizationFailure(_))));

        let empty = Summarizer::new(RecordingBackend::replying(Ok("   ")));
        let result = empty.summarize(&history(), &config, &target).await;
        assert!(matches!(result, Err(CompactionError::SummarizationFailure(_))));
    }

    #[test]
    fn test_select_target_precedence() {
        let current = ModelTarget::new("openai", "gpt-4o");
        let mut config = CompactionConfig::default();

        let target = Summarizer::select_target(&config, ModelOverride::default(), Some(&current)).unwrap();
        assert_eq!(target, current);

        config.provider = Some("ollama".into());
        config.model = Some("qwen2.5:7b".into());
        let target = Summarizer::select_target(&config, ModelOverride::default(), Some(&current)).unwrap();
        assert_eq!(target, ModelTarget::new("ollama", "qwen2.5:7b"));

        let explicit = ModelOverride::new(Some("anthropic".into()), Some("claude".into()));
        let target = Summarizer::select_target(&config, explicit, Some(&current)).unwrap();
        assert_eq!(target, ModelTarget::new("anthropic", "claude"));

        let result = Summarizer::select_target(&CompactionConfig::default(), ModelOverride::default(), None);
        assert!(matches!(result, Err(CompactionError::ModelUnresolved)));
    }
}
