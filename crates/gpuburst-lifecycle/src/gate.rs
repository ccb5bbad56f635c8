//! PoolGate — single-holder admission to the shared node pool.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Admits one holder of the node pool at a time.
#[derive(Clone, Default)]
pub struct PoolGate {
    holder: Arc<Mutex<Option<String>>>,
}

impl PoolGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the pool for `holder`.
    ///
    /// Returns the current holder's name if the pool is already taken.
    pub fn try_acquire(&self, holder: &str) -> Result<PoolLease, String> {
        let mut current = self.lock();
        if let Some(existing) = current.as_ref() {
            return Err(existing.clone());
        }
        *current = Some(holder.to_string());
        debug!(%holder, "pool lease acquired");
        Ok(PoolLease {
            gate: self.clone(),
            holder: holder.to_string(),
        })
    }

    /// Who holds the pool right now, if anyone.
    pub fn holder(&self) -> Option<String> {
        self.lock().clone()
    }
}

/// Exclusive use of the node pool. Released on drop.
pub struct PoolLease {
    gate: PoolGate,
    holder: String,
}

impl PoolLease {
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        let mut current = self.gate.lock();
        if current.as_deref() == Some(self.holder.as_str()) {
            *current = None;
        }
        debug!(holder = %self.holder, "pool lease released");
    }
}
