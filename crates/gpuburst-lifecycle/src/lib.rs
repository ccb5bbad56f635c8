//! gpuburst-lifecycle — the job lifecycle coordinator.
//!
//! Every submitted job runs as its own tokio task through the sequence
//!
//! ```text
//! request_scale(n) ──→ wait_until_ready(n) ──→ workload ──→ request_scale(0)
//!   Starting→ScalingUp   →WaitingForNodes→Running  →Completed   scaled_down_at
//! ```
//!
//! Any step may fail the job (`Failed` + reason). The scale-down step is a
//! finalizer: it runs once on every exit path, including a panic inside the
//! lifecycle, and its own failure is only logged.
//!
//! # Concurrency policy
//!
//! The node pool is a single shared target, so the coordinator admits at
//! most one user of it at a time. A job (or a manual resize) must take the
//! [`PoolLease`] from the [`PoolGate`] before anything is created; a second
//! submission while the lease is held is rejected with
//! [`LifecycleError::PoolBusy`]. A job's lease is released only after its
//! scale-down has run.

pub mod coordinator;
pub mod error;
pub mod gate;
pub mod workload;

pub use coordinator::{Coordinator, JobHandle, JobRequest, LifecycleSettings};
pub use error::{LifecycleError, LifecycleResult, WorkloadError};
pub use gate::{PoolGate, PoolLease};
pub use workload::{TimedWorkload, Workload};
