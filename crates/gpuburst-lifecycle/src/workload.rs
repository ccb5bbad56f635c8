//! The job workload seam.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use gpuburst_state::JobConfig;

use crate::error::WorkloadError;

/// The work a job does once its nodes are ready.
///
/// Opaque to the coordinator: it only observes success or failure, and
/// bounds the call by the job's configured duration plus a grace period.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn run(&self, job_id: &str, config: &JobConfig) -> Result<(), WorkloadError>;
}

/// Occupies the nodes for `config.duration` seconds and succeeds.
///
/// Stands in for submitting to a downstream executor and awaiting
/// completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedWorkload;

#[async_trait]
impl Workload for TimedWorkload {
    async fn run(&self, job_id: &str, config: &JobConfig) -> Result<(), WorkloadError> {
        info!(
            %job_id,
            duration_secs = config.duration,
            gpu_type = %config.gpu_type,
            task_type = %config.task_type,
            "executing GPU workload"
        );
        tokio::time::sleep(Duration::from_secs(config.duration)).await;
        Ok(())
    }
}
