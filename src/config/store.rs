//! Process-wide configuration store backed by a JSON file

use super::policy::{CompactionConfig, ConfigUpdate};
use crate::error::{CompactionError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Holds the in-memory policy and persists it on every update.
///
/// Readers take cheap `Arc` snapshots. Writers are serialized and only swap
/// the snapshot after the file write succeeded, so memory never runs ahead
/// of disk.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<CompactionConfig>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Load from `path`, writing defaults when the file does not exist
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let config = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let mut config: CompactionConfig = serde_json::from_str(&raw).map_err(|e| {
                    CompactionError::Persistence(format!(
                        "malformed configuration at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if let Err(e) = config.validate() {
                    warn!("{} in {}, using defaults for invalid fields", e, path.display());
                    config = sanitize(config);
                }
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, writing defaults", path.display());
                let config = CompactionConfig::default();
                persist(&path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Compaction config loaded: enabled={}, threshold={}",
            config.enabled, config.threshold
        );

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
            write_lock: Mutex::new(()),
        })
    }

    /// Current in-memory snapshot (no disk read)
    pub fn get(&self) -> Arc<CompactionConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, merge, persist and publish a partial update
    pub async fn update(&self, update: ConfigUpdate) -> Result<Arc<CompactionConfig>> {
        let _writer = self.write_lock.lock().await;

        let next = self.get().merged(update);
        next.validate()?;

        if let Err(e) = persist(&self.path, &next).await {
            error!("Configuration update not applied: {}", e);
            return Err(e);
        }

        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        info!(
            "Compaction config updated: enabled={}, threshold={}, provider={:?}, model={:?}",
            next.enabled, next.threshold, next.provider, next.model
        );
        Ok(next)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replace invalid fields with their defaults
fn sanitize(mut config: CompactionConfig) -> CompactionConfig {
    let defaults = CompactionConfig::default();
    if config.threshold.is_nan() || config.threshold <= 0.0 || config.threshold > 1.0 {
        config.threshold = defaults.threshold;
    }
    if config.summary_prompt.trim().is_empty() {
        config.summary_prompt = defaults.summary_prompt;
    }
    if config.simple_prompt.trim().is_empty() {
        config.simple_prompt = defaults.simple_prompt;
    }
    config
}

/// Write the whole file through a sibling temp file and rename
async fn persist(path: &Path, config: &CompactionConfig) -> Result<()> {
    let body = serde_json::to_vec_pretty(config)
        .map_err(|e| CompactionError::Persistence(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "compaction-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("config.json")
    }

    #[tokio::test]
    async fn test_load_missing_file_writes_defaults() {
        let path = temp_path("missing");
        let store = ConfigStore::load(&path).await.unwrap();
        assert_eq!(*store.get(), CompactionConfig::default());

        let on_disk: CompactionConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, CompactionConfig::default());
    }

    #[tokio::test]
    async fn test_load_merges_defaults_over_partial_file() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"provider": "ollama", "threshold": 0.6, "extra": true}"#).unwrap();

        let store = ConfigStore::load(&path).await.unwrap();
        let config = store.get();
        assert_eq!(config.provider.as_deref(), Some("ollama"));
        assert_eq!(config.threshold, 0.6);
        assert!(config.notify_user);
    }

    #[tokio::test]
    async fn test_load_replaces_invalid_threshold() {
        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"threshold": 4.0}"#).unwrap();

        let store = ConfigStore::load(&path).await.unwrap();
        assert_eq!(store.get().threshold, 0.8);
    }

    #[tokio::test]
    async fn test_load_malformed_file_fails() {
        let path = temp_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let result = ConfigStore::load(&path).await;
        assert!(matches!(result, Err(CompactionError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let path = temp_path("update");
        let store = ConfigStore::load(&path).await.unwrap();

        let update = ConfigUpdate::from_json(json!({"threshold": 0.9, "model": "gpt-4o-mini"})).unwrap();
        let updated = store.update(update).await.unwrap();
        assert_eq!(updated.threshold, 0.9);
        assert_eq!(store.get().model.as_deref(), Some("gpt-4o-mini"));

        let reloaded = ConfigStore::load(&path).await.unwrap();
        assert_eq!(*reloaded.get(), *updated);
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous() {
        let path = temp_path("reject");
        let store = ConfigStore::load(&path).await.unwrap();

        for threshold in [0.0, 1.5, -1.0] {
            let update = ConfigUpdate {
                threshold: Some(threshold),
                enabled: Some(false),
                ..Default::default()
            };
            let result = store.update(update).await;
            assert!(matches!(result, Err(CompactionError::ConfigValidation(_))));
        }
        assert_eq!(*store.get(), CompactionConfig::default());
    }

    #[tokio::test]
    async fn test_persistence_failure_rolls_back() {
        let path = temp_path("rollback");
        let store = ConfigStore::load(&path).await.unwrap();

        // A directory where the temp file should go makes the write fail
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::create_dir_all(PathBuf::from(tmp)).unwrap();

        let update = ConfigUpdate {
            threshold: Some(0.5),
            ..Default::default()
        };
        let result = store.update(update).await;
        assert!(matches!(result, Err(CompactionError::Persistence(_))));
        assert_eq!(store.get().threshold, 0.8);
    }
}
