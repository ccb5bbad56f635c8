//! JobStore — in-memory job record storage.
//!
//! Every mutation is a single read-modify-write under the write lock, so a
//! reader never observes a half-applied transition. Reads hand out clones;
//! callers never hold a reference into the map.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Thread-safe job record store.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a record half-written
    // (mutations are applied to a copy first), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a record in state `Starting`.
    ///
    /// Fails with `DuplicateJob` if the id was ever used; the existing record
    /// is left untouched.
    pub fn create(&self, id: &str, config: JobConfig) -> StateResult<JobRecord> {
        let mut jobs = self.write();
        if jobs.contains_key(id) {
            return Err(StateError::DuplicateJob(id.to_string()));
        }
        let record = JobRecord::new(id.to_string(), config, Utc::now());
        jobs.insert(id.to_string(), record.clone());
        debug!(job_id = %id, "job record created");
        Ok(record)
    }

    /// Move a job to `status`.
    ///
    /// Entering `Running` stamps `nodes_ready_at`, entering `Completed` stamps
    /// `completed_at`, entering `Failed` stores `error`. An error passed with
    /// any other status is ignored.
    pub fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> StateResult<JobRecord> {
        self.modify(id, |record| {
            if !record.status.can_transition_to(status) {
                return Err(StateError::InvalidTransition {
                    id: id.to_string(),
                    from: record.status,
                    to: status,
                });
            }
            let now = next_timestamp(record);
            match status {
                JobStatus::Running => record.nodes_ready_at = Some(now),
                JobStatus::Completed => record.completed_at = Some(now),
                JobStatus::Failed => record.error = error,
                _ => {}
            }
            debug!(job_id = %id, from = %record.status, to = %status, "job status updated");
            record.status = status;
            Ok(())
        })
    }

    /// Stamp `scaled_down_at`. Allowed in any status, but only once.
    pub fn mark_scaled_down(&self, id: &str) -> StateResult<JobRecord> {
        self.modify(id, |record| {
            if record.scaled_down_at.is_some() {
                return Err(StateError::AlreadyRecorded {
                    id: id.to_string(),
                    field: "scaled_down_at",
                });
            }
            record.scaled_down_at = Some(next_timestamp(record));
            Ok(())
        })
    }

    /// Apply `f` to a copy of the record and commit it only on success.
    fn modify<F>(&self, id: &str, f: F) -> StateResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> StateResult<()>,
    {
        let mut jobs = self.write();
        let current = jobs
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        let mut updated = current.clone();
        f(&mut updated)?;
        jobs.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    /// Get a copy of a job record.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.read().get(id).cloned()
    }

    /// Point-in-time copy of every record, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Wall-clock now, clamped so timestamps on a record never go backwards.
fn next_timestamp(record: &JobRecord) -> DateTime<Utc> {
    Utc::now().max(record.last_event_at())
}
