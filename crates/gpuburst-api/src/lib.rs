//! gpuburst-api — REST API for gpuburst.
//!
//! Thin mapping from HTTP to the [`Coordinator`]; no lifecycle logic lives
//! here. Request bodies are validated before anything reaches the
//! coordinator, so a malformed request never creates a job record.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness |
//! | POST | `/api/gpu/jobs` | Submit a job |
//! | GET | `/api/gpu/jobs` | List all jobs |
//! | GET | `/api/gpu/jobs/{id}` | Get one job |
//! | GET | `/api/gpu/nodepool/status` | Node pool state |
//! | POST | `/api/gpu/nodepool/scale` | Resize the node pool manually |

pub mod handlers;
pub mod validation;

use axum::Router;
use axum::routing::{get, post};
use gpuburst_lifecycle::Coordinator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Coordinator,
}

/// Build the complete API router.
pub fn build_router(coordinator: Coordinator) -> Router {
    let state = ApiState { coordinator };

    let gpu_routes = Router::new()
        .route("/jobs", get(handlers::list_jobs).post(handlers::create_job))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/nodepool/status", get(handlers::nodepool_status))
        .route("/nodepool/scale", post(handlers::scale_nodepool))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/gpu", gpu_routes)
}
