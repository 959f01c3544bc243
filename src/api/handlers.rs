//! Control surface handlers

use crate::config::{CompactionConfig, ConfigUpdate};
use crate::context::{
    CompactionEngine, CompactionOutcome, CompactionResult, CompletionObservation, ManualCompaction,
    Message, ModelTarget, StatusReport,
};
use crate::error::CompactionError;
use crate::metrics::METRICS;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application state for the control surface
#[derive(Clone)]
pub struct CompactionState {
    pub engine: Arc<CompactionEngine>,
}

/// API error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn error_response(err: CompactionError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        CompactionError::ConfigValidation(_) | CompactionError::ModelUnresolved => {
            StatusCode::BAD_REQUEST
        }
        CompactionError::CompactionInProgress(_) => StatusCode::CONFLICT,
        CompactionError::SummarizationFailure(_) => StatusCode::BAD_GATEWAY,
        CompactionError::Persistence(_)
        | CompactionError::ModelLimitUnavailable { .. }
        | CompactionError::Settings(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}", err);
    } else {
        warn!("{}", err);
    }
    (status, Json(ApiError::new(err.code(), err.to_string())))
}

/// Current configuration
///
/// GET /api/v1/compaction/config
pub async fn get_config(State(state): State<CompactionState>) -> Json<CompactionConfig> {
    Json(state.engine.config().as_ref().clone())
}

/// Partial configuration update
///
/// POST /api/v1/compaction/config
pub async fn update_config(
    State(state): State<CompactionState>,
    Json(body): Json<Value>,
) -> ApiResult<CompactionConfig> {
    let update = ConfigUpdate::from_json(body).map_err(error_response)?;
    let config = state
        .engine
        .update_config(update)
        .await
        .map_err(error_response)?;
    Ok(Json(config.as_ref().clone()))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub conversation_id: Option<String>,
}

/// Usage and pending state
///
/// GET /api/v1/compaction/status
pub async fn get_status(
    State(state): State<CompactionState>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusReport> {
    Json(state.engine.status(query.conversation_id.as_deref()).await)
}

/// Manual compaction, bypassing the threshold
///
/// POST /api/v1/compaction/compact
pub async fn compact(
    State(state): State<CompactionState>,
    Json(request): Json<ManualCompaction>,
) -> ApiResult<CompactionResult> {
    info!(
        "Manual compaction request: conversation={:?}, messages={}",
        request.conversation_id,
        request.messages.len()
    );
    state
        .engine
        .compact_now(request)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct ObserveRequest {
    #[serde(flatten)]
    pub observation: CompletionObservation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObserveResponse {
    pub compacted: bool,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Completion callback for hosts talking to the engine over HTTP
///
/// POST /api/v1/compaction/observe
pub async fn observe(
    State(state): State<CompactionState>,
    Json(request): Json<ObserveRequest>,
) -> Json<ObserveResponse> {
    let outcome = state
        .engine
        .on_completion(&request.observation, &request.messages)
        .await;

    let warning = match &outcome {
        CompactionOutcome::Failed(e) => Some(e.to_string()),
        _ => None,
    };
    let compacted = outcome.is_compacted();

    Json(ObserveResponse {
        compacted,
        messages: outcome.into_messages(request.messages),
        warning,
    })
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub conversation_id: String,
    #[serde(flatten)]
    pub target: ModelTarget,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterResponse {
    pub messages: Vec<Message>,
    pub boundary_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionResult>,
}

/// Request filter for hosts talking to the engine over HTTP: runs `/compact`
/// and applies earlier compaction boundaries
///
/// POST /api/v1/compaction/request
pub async fn filter_request(
    State(state): State<CompactionState>,
    Json(request): Json<FilterRequest>,
) -> Json<FilterResponse> {
    let outcome = state
        .engine
        .handle_request(&request.conversation_id, &request.target, request.messages)
        .await;

    Json(FilterResponse {
        messages: outcome.messages,
        boundary_applied: outcome.boundary_applied,
        compaction: outcome.compaction,
    })
}

/// Prometheus exposition
///
/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}
