//! Control surface route configuration

use super::handlers::{self, CompactionState};
use crate::context::CompactionEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the compaction control surface router
pub fn build_router(engine: Arc<CompactionEngine>, max_body_bytes: usize) -> Router {
    let state = CompactionState { engine };

    Router::new()
        .route(
            "/api/v1/compaction/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route("/api/v1/compaction/status", get(handlers::get_status))
        .route("/api/v1/compaction/compact", post(handlers::compact))
        .route("/api/v1/compaction/observe", post(handlers::observe))
        .route("/api/v1/compaction/request", post(handlers::filter_request))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}
