//! Coordinator error types.

use thiserror::Error;

use gpuburst_pool::{QueryError, ScaleError};
use gpuburst_state::StateError;

/// Errors returned to callers of the coordinator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("node pool is in use by {holder}")]
    PoolBusy { holder: String },

    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("failed to scale nodepool: {0}")]
    Scale(#[from] ScaleError),

    #[error("failed to read nodepool state: {0}")]
    Query(#[from] QueryError),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A workload did not finish normally.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("{0}")]
    Failed(String),

    #[error("workload exceeded its time bound of {limit_secs}s")]
    DeadlineExceeded { limit_secs: u64 },
}
