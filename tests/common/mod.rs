//! Shared fixtures for integration tests
#![allow(dead_code)]


use async_trait::async_trait;
use context_compaction::config::ConfigStore;
use context_compaction::context::{CompactionEngine, Message, ModelTarget};
use context_compaction::providers::{BackendError, CompletionBackend, StaticModelCatalog};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Backend that counts calls and can hold them until released
pub struct ScriptedBackend {
    pub reply: Option<String>,
    pub calls: AtomicUsize,
    pub gated: bool,
    pub entered: Notify,
    pub release: Semaphore,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self::build(Some(reply.to_string()), false))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(None, false))
    }

    pub fn gated(reply: &str) -> Arc<Self> {
        Arc::new(Self::build(Some(reply.to_string()), true))
    }

    fn build(reply: Option<String>, gated: bool) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            gated,
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    /// Let one held call complete
    pub fn release_one(&self) {
        self.release.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, _target: &ModelTarget, _messages: &[Message]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.entered.notify_one();
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }
        self.reply
            .clone()
            .ok_or_else(|| BackendError::ApiError("HTTP 503: overloaded".to_string()))
    }
}

pub fn temp_config_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("compaction-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir.join("config.json")
}

/// Engine with `openai/gpt-4o` known at a 1000 token context window
pub async fn engine_with(name: &str, backend: Arc<ScriptedBackend>) -> Arc<CompactionEngine> {
    let store = Arc::new(ConfigStore::load(temp_config_path(name)).await.unwrap());
    let catalog = Arc::new(StaticModelCatalog::new().with_model("openai", "gpt-4o", 1000));
    Arc::new(CompactionEngine::new(store, catalog, backend, 1000))
}

/// One system message followed by `turns` alternating user/assistant messages
pub fn conversation(turns: usize) -> Vec<Message> {
    let mut messages = vec![Message::system("You are a helpful assistant.")];
    for i in 0..turns {
        if i % 2 == 0 {
            messages.push(Message::user(format!("Question number {}?", i)));
        } else {
            messages.push(Message::assistant(format!("Answer number {}.", i)));
        }
    }
    messages
}
