//! REST API handlers.
//!
//! Each handler validates its input, calls the coordinator, and maps the
//! outcome to a JSON response. Errors are always `{"error": "..."}`.

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use gpuburst_lifecycle::LifecycleError;
use gpuburst_state::{JobStatus, StateError};

use crate::ApiState;
use crate::validation::{self, ValidationError};

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

fn validation_error(e: ValidationError) -> Response {
    warn!(error = %e, "rejected request body");
    error_response(&e.to_string(), StatusCode::BAD_REQUEST)
}

fn lifecycle_error(e: LifecycleError) -> Response {
    let status = match &e {
        LifecycleError::PoolBusy { .. } => StatusCode::CONFLICT,
        LifecycleError::State(StateError::DuplicateJob(_)) => StatusCode::CONFLICT,
        LifecycleError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ── Jobs ───────────────────────────────────────────────────────

/// POST /api/gpu/jobs
pub async fn create_job(State(state): State<ApiState>, body: Bytes) -> Response {
    let request = match validation::parse_job_request(&body) {
        Ok(request) => request,
        Err(e) => return validation_error(e),
    };

    match state.coordinator.submit(request) {
        Ok(handle) => {
            info!(job_id = %handle.job_id, "job submitted");
            (
                StatusCode::CREATED,
                Json(json!({
                    "job_id": handle.job_id,
                    "status": JobStatus::Starting,
                    "message": "GPU job started successfully",
                })),
            )
                .into_response()
        }
        Err(e) => lifecycle_error(e),
    }
}

/// GET /api/gpu/jobs/{id}
pub async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.coordinator.store().get(&id) {
        Some(record) => Json(record).into_response(),
        None => error_response("Job not found", StatusCode::NOT_FOUND),
    }
}

/// GET /api/gpu/jobs
pub async fn list_jobs(State(state): State<ApiState>) -> Response {
    let jobs: BTreeMap<_, _> = state
        .coordinator
        .store()
        .list()
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();
    Json(json!({
        "total_jobs": jobs.len(),
        "jobs": jobs,
    }))
    .into_response()
}

// ── Node pool ──────────────────────────────────────────────────

/// GET /api/gpu/nodepool/status
pub async fn nodepool_status(State(state): State<ApiState>) -> Response {
    match state.coordinator.pool_state().await {
        Ok(pool) => Json(pool).into_response(),
        Err(e) => {
            warn!(error = %e, "nodepool status query failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/gpu/nodepool/scale
pub async fn scale_nodepool(State(state): State<ApiState>, body: Bytes) -> Response {
    let node_count = match validation::parse_scale_request(&body) {
        Ok(n) => n,
        Err(e) => return validation_error(e),
    };

    match state.coordinator.scale_manually(node_count).await {
        Ok(()) => Json(json!({
            "message": format!("Nodepool scaled to {node_count} nodes"),
            "node_count": node_count,
        }))
        .into_response(),
        Err(e) => lifecycle_error(e),
    }
}
