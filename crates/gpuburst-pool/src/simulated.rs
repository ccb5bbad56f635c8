//! SimulatedPool — an in-process stand-in for the cloud node pool.
//!
//! Applies resizes after a configurable settle delay and keeps a history of
//! every requested target. Faults can be injected to exercise the failure
//! paths of the lifecycle: rejected resizes, provisioning that never
//! settles, and failing state queries.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::control::PoolControl;
use crate::error::{QueryError, ScaleError};
use crate::types::{PROVISIONING_SUCCEEDED, PoolState};

/// Resize targets kept in the history; older entries are dropped first.
pub const HISTORY_LIMIT: usize = 1024;

struct SimState {
    pool: PoolState,
    history: Vec<u32>,
    rejected_targets: HashSet<u32>,
    stalled: bool,
    failing_queries: u32,
    settle: Duration,
}

/// In-memory node pool. Clones share the same pool.
#[derive(Clone)]
pub struct SimulatedPool {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedPool {
    /// A pool at zero nodes, settled, that applies resizes immediately.
    pub fn new(name: &str, vm_size: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                pool: PoolState {
                    name: name.to_string(),
                    count: 0,
                    vm_size: vm_size.to_string(),
                    provisioning_state: PROVISIONING_SUCCEEDED.to_string(),
                    power_state: Some("Running".to_string()),
                },
                history: Vec::new(),
                rejected_targets: HashSet::new(),
                stalled: false,
                failing_queries: 0,
                settle: Duration::ZERO,
            })),
        }
    }

    /// Delay between accepting a resize and reporting it as applied.
    pub fn with_settle(self, settle: Duration) -> Self {
        self.lock().settle = settle;
        self
    }

    /// Reject every resize to `target`.
    pub fn reject_resizes_to(&self, target: u32) {
        self.lock().rejected_targets.insert(target);
    }

    /// Leave provisioning stuck in "Scaling" after every resize.
    pub fn stall_provisioning(&self) {
        self.lock().stalled = true;
    }

    /// Fail the next `n` state queries.
    pub fn fail_next_queries(&self, n: u32) {
        self.lock().failing_queries = n;
    }

    /// Targets passed to `request_scale`, in call order, including rejected
    /// ones. Only the most recent [`HISTORY_LIMIT`] are kept.
    pub fn resize_history(&self) -> Vec<u32> {
        self.lock().history.clone()
    }

    /// Current pool state, bypassing fault injection.
    pub fn snapshot(&self) -> PoolState {
        self.lock().pool.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PoolControl for SimulatedPool {
    async fn request_scale(&self, target: u32) -> Result<(), ScaleError> {
        let settle = {
            let mut state = self.lock();
            if state.history.len() == HISTORY_LIMIT {
                state.history.remove(0);
            }
            state.history.push(target);
            if state.rejected_targets.contains(&target) {
                return Err(ScaleError::Rejected {
                    target,
                    status: 409,
                    body: "simulated control plane rejection".to_string(),
                });
            }
            state.pool.provisioning_state = "Scaling".to_string();
            state.settle
        };

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let mut state = self.lock();
        state.pool.count = target;
        if !state.stalled {
            state.pool.provisioning_state = PROVISIONING_SUCCEEDED.to_string();
        }
        debug!(pool = %state.pool.name, target, stalled = state.stalled, "simulated resize applied");
        Ok(())
    }

    async fn get_state(&self) -> Result<PoolState, QueryError> {
        let mut state = self.lock();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(QueryError::Unavailable(
                "simulated query failure".to_string(),
            ));
        }
        Ok(state.pool.clone())
    }
}
