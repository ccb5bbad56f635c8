//! Error types for pool control.

use thiserror::Error;

use crate::types::PoolState;

/// A resize request was rejected or could not be completed.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("control plane rejected resize to {target} (HTTP {status}): {body}")]
    Rejected { target: u32, status: u16, body: String },

    #[error("resize operation to {target} ended as {status}")]
    OperationFailed { target: u32, status: String },

    #[error("resize operation to {target} did not finish within {waited_secs}s")]
    Timeout { target: u32, waited_secs: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed control plane response: {0}")]
    Decode(String),

    #[error("pool lookup before resize failed: {0}")]
    Query(#[from] QueryError),
}

/// The pool state could not be read.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("control plane returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed pool state: {0}")]
    Decode(String),

    #[error("pool state unavailable: {0}")]
    Unavailable(String),
}

/// The pool did not reach the expected state in time.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(
        "pool did not reach {expected} node(s) in state Succeeded within {waited_secs}s (last observed: {})",
        describe(.last_observed)
    )]
    Timeout {
        expected: u32,
        waited_secs: u64,
        last_observed: Option<PoolState>,
    },
}

fn describe(state: &Option<PoolState>) -> String {
    match state {
        Some(s) => format!("count={} provisioning_state={}", s.count, s.provisioning_state),
        None => "nothing".to_string(),
    }
}
