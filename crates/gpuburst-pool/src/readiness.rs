//! Readiness poller — waits for the pool to settle at a node count.
//!
//! Polls [`PoolControl::get_state`] on a fixed interval until the pool
//! reports the expected count with provisioning state `Succeeded`, or the
//! deadline passes. Query failures are soft: they are logged and treated as
//! "not ready yet", so a flaky control plane cannot fail a pool that is
//! otherwise scaling correctly.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::control::PoolControl;
use crate::error::ReadinessError;
use crate::types::PoolState;

/// Default interval between state queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default time allowed for the pool to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Polls a pool until it reaches a target node count.
#[derive(Clone)]
pub struct ReadinessPoller {
    pool: Arc<dyn PoolControl>,
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(pool: Arc<dyn PoolControl>) -> Self {
        Self {
            pool,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the interval between queries.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until the pool reports `expected` nodes in state `Succeeded`.
    ///
    /// Returns the observed ready state, or [`ReadinessError::Timeout`] once
    /// `deadline` has elapsed. The sleep before the deadline is shortened so
    /// a final query happens right at the deadline.
    pub async fn wait_until_ready(
        &self,
        expected: u32,
        deadline: Duration,
    ) -> Result<PoolState, ReadinessError> {
        let start = Instant::now();
        let mut last_observed = None;
        let mut query_failures = 0u32;

        loop {
            match self.pool.get_state().await {
                Ok(state) if state.is_ready_at(expected) => {
                    info!(
                        expected,
                        elapsed_secs = start.elapsed().as_secs(),
                        query_failures,
                        "pool ready"
                    );
                    return Ok(state);
                }
                Ok(state) => {
                    debug!(
                        expected,
                        count = state.count,
                        provisioning_state = %state.provisioning_state,
                        "pool not ready yet"
                    );
                    last_observed = Some(state);
                }
                Err(e) => {
                    query_failures += 1;
                    warn!(expected, error = %e, "pool state query failed, continuing to poll");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(ReadinessError::Timeout {
                    expected,
                    waited_secs: elapsed.as_secs(),
                    last_observed,
                });
            }
            tokio::time::sleep(self.interval.min(deadline - elapsed)).await;
        }
    }
}
