//! Compaction engine: ties usage tracking, threshold evaluation,
//! summarization and history rewriting together.
//!
//! History is only ever replaced after a summary was produced; on any failure
//! the caller keeps its original messages.

use super::boundary::{BoundaryStore, CompactionBoundary};
use super::inflight::{CompactionGuard, InFlightRegistry};
use super::limits::ModelLimitResolver;
use super::models::{estimate_tokens, CompactionResult, Message, ModelOverride, ModelTarget, Role};
use super::rewriter::HistoryRewriter;
use super::summarizer::Summarizer;
use super::threshold::ThresholdEvaluator;
use super::usage::UsageMonitor;
use crate::config::{CompactionConfig, ConfigStore, ConfigUpdate};
use crate::error::{CompactionError, Result};
use crate::metrics::METRICS;
use crate::providers::{CompletionBackend, ModelCatalog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COMPACT_COMMAND: &str = "/compact";
pub const CONTINUE_PROMPT: &str = "Continue our conversation. What would you like to discuss next?";
pub const NOTHING_TO_COMPACT: &str = "No conversation history to compact.";
pub const SUMMARY_FAILED: &str = "Failed to generate summary.";
pub const ALREADY_COMPACTING: &str = "A compaction is already in progress for this conversation.";

/// What started a compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Auto,
    Manual,
    Command,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Auto => "auto",
            Trigger::Manual => "manual",
            Trigger::Command => "command",
        }
    }
}

/// Per-completion usage report from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionObservation {
    pub conversation_id: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
}

/// Result of the automatic path
#[derive(Debug)]
pub enum CompactionOutcome {
    /// Below threshold or disabled
    NotNeeded,
    /// Another compaction for this conversation is running
    InFlight,
    Compacted(CompactionResult),
    /// Summarization failed; history must stay as it was
    Failed(CompactionError),
}

impl CompactionOutcome {
    /// The history the host should use for the next turn
    pub fn into_messages(self, original: Vec<Message>) -> Vec<Message> {
        match self {
            CompactionOutcome::Compacted(result) => result.messages,
            _ => original,
        }
    }

    pub fn is_compacted(&self) -> bool {
        matches!(self, CompactionOutcome::Compacted(_))
    }
}

/// Manual compaction request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualCompaction {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, flatten)]
    pub target: ModelOverride,
}

/// Outcome of inspecting an incoming chat request for `/compact`
#[derive(Debug)]
pub struct RequestOutcome {
    pub messages: Vec<Message>,
    pub compaction: Option<CompactionResult>,
    /// An earlier compaction boundary replaced part of the request
    pub boundary_applied: bool,
}

impl RequestOutcome {
    fn unchanged(messages: Vec<Message>, boundary_applied: bool) -> Self {
        Self {
            messages,
            compaction: None,
            boundary_applied,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStatus {
    pub conversation_id: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub context_limit: u64,
    pub usage_fraction: f64,
    pub compaction_pending: bool,
    pub compacting: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub threshold: f64,
    pub conversations: Vec<ConversationStatus>,
}

/// Context compaction engine
pub struct CompactionEngine {
    config: Arc<ConfigStore>,
    limits: Arc<ModelLimitResolver>,
    usage: Arc<UsageMonitor>,
    evaluator: ThresholdEvaluator,
    summarizer: Summarizer,
    rewriter: HistoryRewriter,
    in_flight: InFlightRegistry,
    boundaries: BoundaryStore,
}

impl CompactionEngine {
    pub fn new(
        config: Arc<ConfigStore>,
        catalog: Arc<dyn ModelCatalog>,
        backend: Arc<dyn CompletionBackend>,
        usage_capacity: u64,
    ) -> Self {
        let limits = Arc::new(ModelLimitResolver::new(catalog));
        let usage = Arc::new(UsageMonitor::new(limits.clone(), usage_capacity));
        let evaluator = ThresholdEvaluator::new(config.clone(), usage.clone());

        Self {
            config,
            limits,
            usage,
            evaluator,
            summarizer: Summarizer::new(backend),
            rewriter: HistoryRewriter::default(),
            in_flight: InFlightRegistry::new(),
            boundaries: BoundaryStore::new(usage_capacity),
        }
    }

    pub fn with_rewriter(mut self, rewriter: HistoryRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn config(&self) -> Arc<CompactionConfig> {
        self.config.get()
    }

    pub async fn update_config(&self, update: ConfigUpdate) -> Result<Arc<CompactionConfig>> {
        self.config.update(update).await
    }

    pub fn usage(&self) -> &Arc<UsageMonitor> {
        &self.usage
    }

    pub fn limits(&self) -> &Arc<ModelLimitResolver> {
        &self.limits
    }

    pub async fn boundary(&self, conversation_id: &str) -> Option<CompactionBoundary> {
        self.boundaries.get(conversation_id).await
    }

    pub async fn should_compact(&self, conversation_id: &str) -> bool {
        self.evaluator.should_compact(conversation_id).await
    }

    pub fn is_compacting(&self, conversation_id: &str) -> bool {
        self.in_flight.is_active(conversation_id)
    }

    /// Response-filter hook: record usage and compact when the threshold is crossed
    pub async fn on_completion(
        &self,
        observation: &CompletionObservation,
        messages: &[Message],
    ) -> CompactionOutcome {
        let id = observation.conversation_id.as_str();
        self.usage
            .record(id, &observation.provider, &observation.model, observation.prompt_tokens)
            .await;

        let config = self.config.get();
        if !self.evaluator.should_compact_with(&config, id).await {
            return CompactionOutcome::NotNeeded;
        }

        let Some(guard) = self.in_flight.try_acquire(id) else {
            debug!("Compaction for {} already in flight, skipping", id);
            METRICS.record_compaction(Trigger::Auto, "in_flight");
            return CompactionOutcome::InFlight;
        };

        let current = ModelTarget::new(observation.provider.clone(), observation.model.clone());
        info!(
            "Conversation {} crossed threshold {} at {} prompt tokens, compacting",
            id, config.threshold, observation.prompt_tokens
        );

        match self
            .compact_locked(
                &guard,
                messages,
                &config,
                ModelOverride::default(),
                Some(&current),
                observation.prompt_tokens,
                Trigger::Auto,
            )
            .await
        {
            Ok(result) => {
                // rewritten history supersedes any earlier boundary
                self.boundaries.clear(id).await;
                CompactionOutcome::Compacted(result)
            }
            Err(e) => {
                warn!("Automatic compaction for {} aborted, history kept: {}", id, e);
                CompactionOutcome::Failed(e)
            }
        }
    }

    /// Manual trigger: bypasses the threshold gate
    pub async fn compact_now(&self, request: ManualCompaction) -> Result<CompactionResult> {
        self.compact_manual(request, Trigger::Manual).await
    }

    async fn compact_manual(&self, request: ManualCompaction, trigger: Trigger) -> Result<CompactionResult> {
        let config = self.config.get();

        let Some(id) = request.conversation_id.as_deref() else {
            let tokens_before = estimate_tokens(&request.messages);
            return self
                .compact(&request.messages, &config, request.target, None, tokens_before, trigger)
                .await;
        };

        let guard = self.in_flight.try_acquire(id).ok_or_else(|| {
            METRICS.record_compaction(trigger, "in_flight");
            CompactionError::CompactionInProgress(id.to_string())
        })?;

        let observed = self.usage.get(id).await;
        let current = observed.as_ref().map(|u| u.target.clone());
        let tokens_before = observed
            .map(|u| u.prompt_tokens)
            .unwrap_or_else(|| estimate_tokens(&request.messages));

        let result = self
            .compact_locked(
                &guard,
                &request.messages,
                &config,
                request.target,
                current.as_ref(),
                tokens_before,
                trigger,
            )
            .await?;

        self.boundaries
            .set(
                id,
                CompactionBoundary::new(
                    request.messages.len(),
                    result.summary_text.clone(),
                    result.messages.clone(),
                ),
            )
            .await;
        Ok(result)
    }

    /// Request-filter hook: handles a trailing `/compact` command.
    ///
    /// Any other request gets the conversation's compaction boundary applied,
    /// so a client resending its full history keeps the compacted view.
    pub async fn handle_request(
        &self,
        conversation_id: &str,
        current: &ModelTarget,
        mut messages: Vec<Message>,
    ) -> RequestOutcome {
        let is_command = messages
            .last()
            .map(|m| m.role == Role::User && m.text().trim_start().starts_with(COMPACT_COMMAND))
            .unwrap_or(false);
        if !is_command {
            return match self.boundaries.apply(conversation_id, &messages).await {
                Some(applied) => {
                    debug!(
                        "Applied boundary for {}: {} -> {} messages",
                        conversation_id,
                        messages.len(),
                        applied.len()
                    );
                    RequestOutcome::unchanged(applied, true)
                }
                None => RequestOutcome::unchanged(messages, false),
            };
        }

        let received = messages.len();
        let Some(command) = messages.pop() else {
            return RequestOutcome::unchanged(messages, false);
        };

        info!("/compact command for {}", conversation_id);

        let boundary_applied = match self.boundaries.apply(conversation_id, &messages).await {
            Some(applied) => {
                messages = applied;
                true
            }
            None => false,
        };

        if messages.is_empty() {
            messages.push(command.with_text(NOTHING_TO_COMPACT));
            return RequestOutcome::unchanged(messages, boundary_applied);
        }

        let Some(guard) = self.in_flight.try_acquire(conversation_id) else {
            METRICS.record_compaction(Trigger::Command, "in_flight");
            messages.push(command.with_text(ALREADY_COMPACTING));
            return RequestOutcome::unchanged(messages, boundary_applied);
        };

        let config = self.config.get();
        let tokens_before = match self.usage.get(conversation_id).await {
            Some(usage) => usage.prompt_tokens,
            None => estimate_tokens(&messages),
        };

        match self
            .compact_locked(
                &guard,
                &messages,
                &config,
                ModelOverride::default(),
                Some(current),
                tokens_before,
                Trigger::Command,
            )
            .await
        {
            Ok(result) => {
                let mut compacted = result.messages.clone();
                compacted.push(command.with_text(CONTINUE_PROMPT));
                self.boundaries
                    .set(
                        conversation_id,
                        CompactionBoundary::new(received, result.summary_text.clone(), compacted.clone()),
                    )
                    .await;
                RequestOutcome {
                    messages: compacted,
                    compaction: Some(result),
                    boundary_applied,
                }
            }
            Err(e) => {
                warn!("/compact for {} failed, history kept: {}", conversation_id, e);
                messages.push(command.with_text(SUMMARY_FAILED));
                RequestOutcome::unchanged(messages, boundary_applied)
            }
        }
    }

    /// Compaction while holding the conversation's in-flight marker; usage is
    /// cleared on success since the old count no longer applies
    #[allow(clippy::too_many_arguments)]
    async fn compact_locked(
        &self,
        guard: &CompactionGuard,
        messages: &[Message],
        config: &CompactionConfig,
        target: ModelOverride,
        current: Option<&ModelTarget>,
        tokens_before: u64,
        trigger: Trigger,
    ) -> Result<CompactionResult> {
        let result = self
            .compact(messages, config, target, current, tokens_before, trigger)
            .await?;
        self.usage.clear(guard.conversation_id()).await;
        Ok(result)
    }

    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
        target: ModelOverride,
        current: Option<&ModelTarget>,
        tokens_before: u64,
        trigger: Trigger,
    ) -> Result<CompactionResult> {
        let outcome = self
            .summarize_and_rewrite(messages, config, target, current, tokens_before)
            .await;
        METRICS.record_compaction(trigger, if outcome.is_ok() { "success" } else { "failure" });
        outcome
    }

    async fn summarize_and_rewrite(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
        target: ModelOverride,
        current: Option<&ModelTarget>,
        tokens_before: u64,
    ) -> Result<CompactionResult> {
        let target = Summarizer::select_target(config, target, current)?;
        let summary_text = self.summarizer.summarize(messages, config, &target).await?;
        let rewritten = self
            .rewriter
            .rewrite(messages, &summary_text, config.notify_user);

        let tokens_after = estimate_tokens(&rewritten);
        let reduction = if tokens_before > 0 {
            (tokens_before.saturating_sub(tokens_after) as f64 / tokens_before as f64) * 100.0
        } else {
            0.0
        };
        info!(
            "Compacted {} -> {} messages with {}, ~{:.0}% reduction ({} -> ~{} tokens)",
            messages.len(),
            rewritten.len(),
            target,
            reduction,
            tokens_before,
            tokens_after
        );

        Ok(CompactionResult {
            summary_text,
            messages_before: messages.len(),
            messages_after: rewritten.len(),
            tokens_before,
            messages: rewritten,
        })
    }

    /// Usage and pending state, for one conversation or all tracked ones
    pub async fn status(&self, conversation_id: Option<&str>) -> StatusReport {
        let config = self.config.get();

        let entries = match conversation_id {
            Some(id) => self
                .usage
                .get(id)
                .await
                .map(|usage| vec![(id.to_string(), usage)])
                .unwrap_or_default(),
            None => self.usage.snapshot(),
        };

        let mut conversations: Vec<ConversationStatus> = entries
            .into_iter()
            .map(|(id, usage)| {
                let fraction = usage.usage_fraction();
                let compacting = self.in_flight.is_active(&id);
                ConversationStatus {
                    compaction_pending: !compacting && config.is_over_threshold(fraction),
                    compacting,
                    provider: usage.target.provider,
                    model: usage.target.model,
                    prompt_tokens: usage.prompt_tokens,
                    context_limit: usage.context_limit,
                    usage_fraction: fraction,
                    last_updated: usage.last_updated,
                    conversation_id: id,
                }
            })
            .collect();
        conversations.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));

        StatusReport {
            enabled: config.enabled,
            threshold: config.threshold,
            conversations,
        }
    }
}
