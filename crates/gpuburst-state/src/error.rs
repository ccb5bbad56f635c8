//! Error types for the job record store.

use thiserror::Error;

use crate::types::JobStatus;

/// Result type alias for job store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("job already exists: {0}")]
    DuplicateJob(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id}: {field} already recorded")]
    AlreadyRecorded { id: String, field: &'static str },
}
