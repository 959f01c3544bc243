//! Server settings for the standalone compaction service
//!
//! Loaded from an optional TOML file plus `COMPACTION__*` environment
//! variables, e.g. `COMPACTION__BIND_ADDR=0.0.0.0:9000`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Location of the compaction policy JSON file
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Maximum number of conversations with tracked usage
    #[serde(default = "default_usage_capacity")]
    pub usage_capacity: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Provider endpoints keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from("compaction.json")
}

fn default_usage_capacity() -> u64 {
    10_000
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_retries() -> usize {
    2
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            config_path: default_config_path(),
            usage_capacity: default_usage_capacity(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            max_body_bytes: default_max_body_bytes(),
            logging: LoggingSettings::default(),
            providers: HashMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One OpenAI-compatible provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL, `/chat/completions` is appended
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Known context windows for this provider's models
    #[serde(default)]
    pub models: Vec<ModelSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub name: String,
    pub context_limit: u64,
}

impl ServerSettings {
    /// Load settings from `path` (if present) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("COMPACTION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
