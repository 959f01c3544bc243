//! Standalone compaction control surface

use anyhow::Context;
use context_compaction::api::build_router;
use context_compaction::config::{ConfigStore, ServerSettings};
use context_compaction::context::CompactionEngine;
use context_compaction::providers::{OpenAiCompatibleBackend, StaticModelCatalog};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings_path = std::env::var("COMPACTION_SETTINGS").ok();
    let settings = ServerSettings::load(settings_path.as_deref())
        .context("failed to load server settings")?;

    init_tracing(&settings);

    let store = Arc::new(
        ConfigStore::load(&settings.config_path)
            .await
            .context("failed to load compaction config")?,
    );
    let catalog = Arc::new(StaticModelCatalog::from_settings(&settings.providers));
    let backend = Arc::new(
        OpenAiCompatibleBackend::from_settings(&settings)
            .context("failed to build completion backend")?,
    );

    let engine = Arc::new(CompactionEngine::new(
        store,
        catalog,
        backend,
        settings.usage_capacity,
    ));
    let app = build_router(engine, settings.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(
        "Compaction server listening on {} ({} providers configured)",
        settings.bind_addr,
        settings.providers.len()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(settings: &ServerSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
