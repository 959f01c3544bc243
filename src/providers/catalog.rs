//! Model catalog backed by a static table

use super::{CatalogError, ModelCatalog, ModelInfo};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use std::collections::HashMap;

/// Catalog of known context windows, keyed by provider then model
#[derive(Debug, Clone, Default)]
pub struct StaticModelCatalog {
    providers: HashMap<String, HashMap<String, u64>>,
}

impl StaticModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model's context window
    pub fn with_model(mut self, provider: &str, model: &str, context_limit: u64) -> Self {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), context_limit);
        self
    }

    /// Build from provider settings
    pub fn from_settings(providers: &HashMap<String, ProviderSettings>) -> Self {
        providers
            .iter()
            .flat_map(|(provider, settings)| {
                settings
                    .models
                    .iter()
                    .map(move |m| (provider.as_str(), m.name.as_str(), m.context_limit))
            })
            .fold(Self::new(), |catalog, (provider, model, limit)| {
                catalog.with_model(provider, model, limit)
            })
    }
}

#[async_trait]
impl ModelCatalog for StaticModelCatalog {
    async fn model_info(&self, provider: &str, model: &str) -> Result<ModelInfo, CatalogError> {
        let models = self
            .providers
            .get(provider)
            .ok_or_else(|| CatalogError::UnknownProvider(provider.to_string()))?;
        let limit = models
            .get(model)
            .ok_or_else(|| CatalogError::UnknownModel(model.to_string()))?;
        Ok(ModelInfo {
            context_limit: Some(*limit),
        })
    }
}
