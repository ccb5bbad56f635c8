//! Domain types for the job record store.
//!
//! These are also the wire types: the HTTP API serializes `JobRecord`
//! directly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job.
pub type JobId = String;

/// Default node count for a job that does not specify one.
pub const DEFAULT_NODE_COUNT: u32 = 1;

/// Default workload duration in seconds.
pub const DEFAULT_DURATION_SECS: u64 = 300;

/// Default GPU VM size tag.
pub const DEFAULT_GPU_TYPE: &str = "Standard_NC6s_v3";

/// Default task type tag.
pub const DEFAULT_TASK_TYPE: &str = "training";

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, scale-up requested.
    Starting,
    /// Scale-up accepted, waiting for the pool to settle.
    ScalingUp,
    /// Pool reported ready, workload about to start.
    WaitingForNodes,
    /// Workload executing.
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::ScalingUp => "scaling_up",
            Self::WaitingForNodes => "waiting_for_nodes",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Every non-terminal state may fail; otherwise the path is strictly
    /// forward, one step at a time.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Starting, ScalingUp)
                | (ScalingUp, WaitingForNodes)
                | (WaitingForNodes, Running)
                | (Running, Completed)
                | (Starting | ScalingUp | WaitingForNodes | Running, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Config ─────────────────────────────────────────────────────────

/// Immutable job parameters captured at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Nodes the pool is scaled to for this job.
    pub node_count: u32,
    /// Workload duration in seconds.
    pub duration: u64,
    pub gpu_type: String,
    pub task_type: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            duration: DEFAULT_DURATION_SECS,
            gpu_type: DEFAULT_GPU_TYPE.to_string(),
            task_type: DEFAULT_TASK_TYPE.to_string(),
        }
    }
}

// ── Record ─────────────────────────────────────────────────────────

/// Everything known about one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "job_id")]
    pub id: JobId,
    pub status: JobStatus,
    pub config: JobConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_ready_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaled_down_at: Option<DateTime<Utc>>,
    /// Failure reason. Only set when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, config: JobConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Starting,
            config,
            created_at: now,
            nodes_ready_at: None,
            completed_at: None,
            scaled_down_at: None,
            error: None,
        }
    }

    /// Latest timestamp recorded on this job.
    pub fn last_event_at(&self) -> DateTime<Utc> {
        [self.nodes_ready_at, self.completed_at, self.scaled_down_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, Ord::max)
    }
}
