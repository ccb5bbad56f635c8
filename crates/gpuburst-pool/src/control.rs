//! The pool control capability.

use async_trait::async_trait;

use crate::error::{QueryError, ScaleError};
use crate::types::PoolState;

/// Resize and inspect the single shared node pool.
///
/// Implementations hold no per-call state and are safe to call concurrently.
/// The pool itself is one shared target though: two overlapping
/// `request_scale` calls race at the control plane, and whichever is applied
/// last wins. Callers are responsible for serializing them.
#[async_trait]
pub trait PoolControl: Send + Sync {
    /// Resize the pool to `target` nodes.
    ///
    /// Returns once the control plane reports the operation as finished, or
    /// as definitively failed. Never retries.
    async fn request_scale(&self, target: u32) -> Result<(), ScaleError>;

    /// Read the current pool state.
    async fn get_state(&self) -> Result<PoolState, QueryError>;
}
