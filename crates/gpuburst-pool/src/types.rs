//! Observed pool state.

use serde::{Deserialize, Serialize};

/// Provisioning state reported once a resize has been fully applied.
pub const PROVISIONING_SUCCEEDED: &str = "Succeeded";

/// Read-only view of the node pool as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub name: String,
    /// Requested node count.
    pub count: u32,
    pub vm_size: String,
    /// Status of the most recent operation on the pool ("Succeeded",
    /// "Scaling", "Updating", "Failed", ...).
    pub provisioning_state: String,
    pub power_state: Option<String>,
}

impl PoolState {
    /// Whether the pool has settled at exactly `expected` nodes.
    pub fn is_ready_at(&self, expected: u32) -> bool {
        self.count == expected && self.provisioning_state == PROVISIONING_SUCCEEDED
    }
}
