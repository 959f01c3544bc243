//! Host collaboration points: completion execution and model metadata

pub mod catalog;
pub mod openai;

pub use catalog::StaticModelCatalog;
pub use openai::{OpenAiCompatibleBackend, ProviderEndpoint};

use crate::context::models::{Message, ModelTarget};
use async_trait::async_trait;
use thiserror::Error;

/// Executes a completion call on behalf of the engine
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run `messages` against `target` and return the response text
    async fn complete(&self, target: &ModelTarget, messages: &[Message]) -> Result<String, BackendError>;
}

/// Model metadata as reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    pub context_limit: Option<u64>,
}

/// Source of provider model metadata
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn model_info(&self, provider: &str, model: &str) -> Result<ModelInfo, CatalogError>;
}

/// Completion backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Metadata lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Metadata unavailable: {0}")]
    Unavailable(String),
}
