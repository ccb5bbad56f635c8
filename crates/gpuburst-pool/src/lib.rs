//! gpuburst-pool — control over the shared GPU node pool.
//!
//! The rest of gpuburst treats the cloud control plane as a capability with
//! two operations: resize the pool, and read its current state. This crate
//! defines that capability ([`PoolControl`]), two implementations of it, and
//! the readiness poller built on top.
//!
//! # Architecture
//!
//! ```text
//! PoolControl (trait)
//!   ├── AksPool        ARM REST API (GET / PUT agentPools + async operation polling)
//!   └── SimulatedPool  in-process pool with fault injection
//!
//! ReadinessPoller
//!   └── get_state() every `interval` until count == expected && Succeeded,
//!       or `deadline` elapses. Query errors are absorbed.
//! ```
//!
//! Adapters never retry. Retry and timeout policy belongs to the caller.

pub mod aks;
pub mod control;
pub mod error;
pub mod readiness;
pub mod simulated;
pub mod types;

pub use aks::{AksPool, AksPoolConfig};
pub use control::PoolControl;
pub use error::{QueryError, ReadinessError, ScaleError};
pub use readiness::ReadinessPoller;
pub use simulated::SimulatedPool;
pub use types::{PROVISIONING_SUCCEEDED, PoolState};
