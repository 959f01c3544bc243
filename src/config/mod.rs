//! Compaction policy store and server settings

pub mod policy;
pub mod settings;
pub mod store;

pub use policy::{CompactionConfig, ConfigUpdate, DEFAULT_SIMPLE_PROMPT, DEFAULT_SUMMARY_PROMPT};
pub use settings::{LoggingSettings, ModelSettings, ProviderSettings, ServerSettings};
pub use store::ConfigStore;
