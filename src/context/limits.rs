//! Context window resolution with memoization and conservative fallbacks

use super::models::ModelLimit;
use crate::error::CompactionError;
use crate::metrics::METRICS;
use crate::providers::{CatalogError, ModelCatalog};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Global default when neither metadata nor a provider family matches
pub const DEFAULT_CONTEXT_LIMIT: u64 = 4096;

/// Context window floors by provider family, the smallest current model of each
const FAMILY_FALLBACKS: &[(&str, u64)] = &[
    ("anthropic", 100_000),
    ("openai", 16_384),
    ("gemini", 32_768),
    ("google", 32_768),
    ("mistral", 32_000),
    ("groq", 8_192),
    ("openrouter", 8_192),
    ("ollama", 4_096),
];

/// Fallback context window for a provider name.
///
/// A family matches the whole name or a prefix followed by a separator
/// (`google-vertex`, `openai/azure`).
pub fn fallback_limit(provider: &str) -> u64 {
    let provider = provider.to_ascii_lowercase();
    FAMILY_FALLBACKS
        .iter()
        .find(|(family, _)| is_family(&provider, family))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

fn is_family(provider: &str, family: &str) -> bool {
    match provider.strip_prefix(family) {
        Some("") => true,
        Some(rest) => rest.starts_with(['-', '_', '/', ':', '.']),
        None => false,
    }
}

/// Resolves the effective context window for provider/model pairs
pub struct ModelLimitResolver {
    catalog: Arc<dyn ModelCatalog>,
    cache: DashMap<(String, String), ModelLimit>,
}

impl ModelLimitResolver {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog,
            cache: DashMap::new(),
        }
    }

    /// Context window in tokens. Never fails; falls back on missing metadata.
    pub async fn resolve(&self, provider: &str, model: &str) -> u64 {
        let key = (provider.to_string(), model.to_string());
        if let Some(limit) = self.cache.get(&key) {
            return limit.context_tokens;
        }

        match self.lookup(provider, model).await {
            Ok(context_tokens) => {
                debug!("Context limit for {}/{}: {}", provider, model, context_tokens);
                self.cache.insert(
                    key,
                    ModelLimit {
                        provider: provider.to_string(),
                        model: model.to_string(),
                        context_tokens,
                    },
                );
                context_tokens
            }
            Err(e) => {
                let fallback = fallback_limit(provider);
                warn!("{}, using fallback of {} tokens", e, fallback);
                METRICS.model_limit_fallbacks.inc();
                fallback
            }
        }
    }

    async fn lookup(&self, provider: &str, model: &str) -> Result<u64, CompactionError> {
        let unavailable = |reason: String| CompactionError::ModelLimitUnavailable {
            provider: provider.to_string(),
            model: model.to_string(),
            reason,
        };

        let info = self
            .catalog
            .model_info(provider, model)
            .await
            .map_err(|e: CatalogError| unavailable(e.to_string()))?;

        match info.context_limit {
            Some(limit) if limit > 0 => Ok(limit),
            Some(_) => Err(unavailable("reported a zero context limit".to_string())),
            None => Err(unavailable("metadata has no context limit".to_string())),
        }
    }

    /// Number of memoized provider/model pairs
    pub fn cached_models(&self) -> usize {
        self.cache.len()
    }
}
