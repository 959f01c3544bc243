//! Error types for the compaction engine

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, CompactionError>;

/// Errors surfaced by the compaction engine and its control surface.
///
/// None of these are fatal to the host; every failure leaves conversation
/// history untouched.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("Context limit unavailable for {provider}/{model}: {reason}")]
    ModelLimitUnavailable {
        provider: String,
        model: String,
        reason: String,
    },

    #[error("Summarization failed: {0}")]
    SummarizationFailure(String),

    #[error("Failed to persist configuration: {0}")]
    Persistence(String),

    #[error("Compaction already in progress for conversation {0}")]
    CompactionInProgress(String),

    #[error("No provider/model available for summarization")]
    ModelUnresolved,

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl CompactionError {
    /// Stable machine-readable code used by the control surface
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigValidation(_) => "VALIDATION_ERROR",
            Self::ModelLimitUnavailable { .. } => "MODEL_LIMIT_UNAVAILABLE",
            Self::SummarizationFailure(_) => "SUMMARIZATION_FAILED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::CompactionInProgress(_) => "COMPACTION_IN_PROGRESS",
            Self::ModelUnresolved => "MODEL_UNRESOLVED",
            Self::Settings(_) => "SETTINGS_ERROR",
        }
    }
}

impl From<std::io::Error> for CompactionError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
