//! Coordinator — drives each job from submission to scale-down.
//!
//! `submit` takes the pool lease, creates the job record and spawns the
//! lifecycle task, then returns without waiting. The task runs the
//! lifecycle body in a child task of its own so that a panic anywhere in the
//! body still reaches the finalizer; the outcome is only observable through
//! the job store.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use gpuburst_pool::{PoolControl, PoolState, ReadinessError, ReadinessPoller, ScaleError};
use gpuburst_state::{JobConfig, JobId, JobStatus, JobStore, StateError};

use crate::error::{LifecycleError, LifecycleResult, WorkloadError};
use crate::gate::{PoolGate, PoolLease};
use crate::workload::Workload;

/// Lease holder name used for resizes outside a job.
const MANUAL_SCALE_HOLDER: &str = "manual scale";

/// Timing knobs for the lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Interval between pool state queries while waiting for nodes.
    pub poll_interval: Duration,
    /// How long the pool may take to become ready.
    pub ready_timeout: Duration,
    /// Slack on top of a job's duration before its workload is abandoned.
    pub workload_grace: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            poll_interval: gpuburst_pool::readiness::DEFAULT_POLL_INTERVAL,
            ready_timeout: gpuburst_pool::readiness::DEFAULT_READY_TIMEOUT,
            workload_grace: Duration::from_secs(30),
        }
    }
}

/// A job submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRequest {
    /// Caller-chosen id. Generated from the submission time if absent.
    pub job_id: Option<String>,
    pub config: JobConfig,
}

/// The spawned lifecycle of one job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    pub task: JoinHandle<()>,
}

/// Why a job ended in `Failed`.
#[derive(Debug)]
enum JobFailure {
    ScaleUp(ScaleError),
    NotReady(ReadinessError),
    Workload(WorkloadError),
    Record(StateError),
    Panicked(String),
}

impl JobFailure {
    /// The reason stored on the job record.
    fn reason(&self) -> String {
        match self {
            Self::ScaleUp(_) => "failed to scale up nodepool".to_string(),
            Self::NotReady(_) => "nodes not ready within timeout".to_string(),
            Self::Workload(e) => e.to_string(),
            Self::Record(e) => e.to_string(),
            Self::Panicked(msg) => format!("job panicked: {msg}"),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleUp(e) => write!(f, "{}: {e}", self.reason()),
            Self::NotReady(e) => write!(f, "{}: {e}", self.reason()),
            _ => f.write_str(&self.reason()),
        }
    }
}

struct Inner {
    store: JobStore,
    pool: Arc<dyn PoolControl>,
    poller: ReadinessPoller,
    workload: Arc<dyn Workload>,
    gate: PoolGate,
    settings: LifecycleSettings,
    sequence: AtomicU64,
}

/// Sequences scale-up, readiness, workload and scale-down for every job.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        store: JobStore,
        pool: Arc<dyn PoolControl>,
        workload: Arc<dyn Workload>,
        settings: LifecycleSettings,
    ) -> Self {
        let poller = ReadinessPoller::new(Arc::clone(&pool)).with_interval(settings.poll_interval);
        Self {
            inner: Arc::new(Inner {
                store,
                pool,
                poller,
                workload,
                gate: PoolGate::new(),
                settings,
                sequence: AtomicU64::new(1),
            }),
        }
    }

    /// The job store this coordinator writes to.
    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Who holds the node pool right now, if anyone.
    pub fn pool_holder(&self) -> Option<String> {
        self.inner.gate.holder()
    }

    /// Accept a job and start its lifecycle in the background.
    ///
    /// Returns as soon as the record exists in state `Starting`. Rejected
    /// with `PoolBusy` while another job or a manual resize holds the pool,
    /// and with `State(DuplicateJob)` if the id was ever used. Neither
    /// rejection creates or touches a record.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: JobRequest) -> LifecycleResult<JobHandle> {
        let job_id = match request.job_id {
            Some(id) if id.trim().is_empty() => return Err(LifecycleError::InvalidJobId(id)),
            Some(id) => id,
            None => self.generate_id(),
        };
        if self.inner.store.contains(&job_id) {
            return Err(StateError::DuplicateJob(job_id).into());
        }

        let lease = self
            .inner
            .gate
            .try_acquire(&job_id)
            .map_err(|holder| LifecycleError::PoolBusy { holder })?;
        let record = self.inner.store.create(&job_id, request.config)?;

        info!(
            job_id = %record.id,
            node_count = record.config.node_count,
            duration_secs = record.config.duration,
            gpu_type = %record.config.gpu_type,
            task_type = %record.config.task_type,
            "job accepted"
        );

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.run_job(record.id, record.config, lease));
        Ok(JobHandle { job_id, task })
    }

    /// Resize the pool outside any job.
    ///
    /// Holds the pool lease for the duration of the resize, so it is refused
    /// while a job is active. The resize runs in its own task and completes
    /// even if the caller goes away.
    pub async fn scale_manually(&self, node_count: u32) -> LifecycleResult<()> {
        let lease = self
            .inner
            .gate
            .try_acquire(MANUAL_SCALE_HOLDER)
            .map_err(|holder| LifecycleError::PoolBusy { holder })?;

        info!(node_count, "manual nodepool resize");
        let pool = Arc::clone(&self.inner.pool);
        let result = tokio::spawn(async move {
            let _lease = lease;
            pool.request_scale(node_count).await
        })
        .await
        .map_err(|e| LifecycleError::Task(e.to_string()))?;

        result.map_err(|e| {
            error!(node_count, error = %e, "manual nodepool resize failed");
            LifecycleError::from(e)
        })
    }

    /// Current pool state as reported by the control plane.
    pub async fn pool_state(&self) -> LifecycleResult<PoolState> {
        Ok(self.inner.pool.get_state().await?)
    }

    /// `job_<unix seconds>_<sequence>`, skipping any id already taken.
    fn generate_id(&self) -> JobId {
        loop {
            let seq = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
            let id = format!("job_{}_{seq}", Utc::now().timestamp());
            if !self.inner.store.contains(&id) {
                return id;
            }
        }
    }
}

impl Inner {
    /// The whole life of one job. The lease is held until scale-down is done.
    async fn run_job(self: Arc<Self>, id: JobId, config: JobConfig, lease: PoolLease) {
        let body = {
            let inner = Arc::clone(&self);
            let id = id.clone();
            tokio::spawn(async move { inner.drive(&id, &config).await })
        };

        let outcome = match body.await {
            Ok(outcome) => outcome,
            Err(e) => Err(JobFailure::Panicked(join_error_message(e))),
        };

        match outcome {
            Ok(()) => info!(job_id = %id, "job completed"),
            Err(failure) => {
                error!(job_id = %id, error = %failure, "job failed");
                if let Err(e) = self
                    .store
                    .update_status(&id, JobStatus::Failed, Some(failure.reason()))
                {
                    error!(job_id = %id, error = %e, "could not record job failure");
                }
            }
        }

        self.scale_down(&id).await;
        drop(lease);
    }

    /// Scale up, wait for nodes, run the workload.
    async fn drive(&self, id: &str, config: &JobConfig) -> Result<(), JobFailure> {
        info!(job_id = %id, node_count = config.node_count, "scaling up nodepool");
        self.pool
            .request_scale(config.node_count)
            .await
            .map_err(JobFailure::ScaleUp)?;
        self.record(id, JobStatus::ScalingUp)?;

        self.poller
            .wait_until_ready(config.node_count, self.settings.ready_timeout)
            .await
            .map_err(JobFailure::NotReady)?;
        self.record(id, JobStatus::WaitingForNodes)?;
        self.record(id, JobStatus::Running)?;
        info!(job_id = %id, "nodes ready, job running");

        self.execute(id, config).await?;
        self.record(id, JobStatus::Completed)
    }

    /// Run the workload, bounded by its duration plus the grace period.
    async fn execute(&self, id: &str, config: &JobConfig) -> Result<(), JobFailure> {
        let limit =
            Duration::from_secs(config.duration).saturating_add(self.settings.workload_grace);
        match tokio::time::timeout(limit, self.workload.run(id, config)).await {
            Ok(result) => result.map_err(JobFailure::Workload),
            Err(_) => Err(JobFailure::Workload(WorkloadError::DeadlineExceeded {
                limit_secs: limit.as_secs(),
            })),
        }
    }

    fn record(&self, id: &str, status: JobStatus) -> Result<(), JobFailure> {
        self.store
            .update_status(id, status, None)
            .map(|_| ())
            .map_err(JobFailure::Record)
    }

    /// Finalizer: scale to zero and stamp `scaled_down_at`, whatever happened.
    async fn scale_down(&self, id: &str) {
        info!(job_id = %id, "scaling down nodepool");
        if let Err(e) = self.pool.request_scale(0).await {
            warn!(job_id = %id, error = %e, "scale-down failed, pool may still hold nodes");
        }
        if let Err(e) = self.store.mark_scaled_down(id) {
            error!(job_id = %id, error = %e, "could not record scale-down");
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
