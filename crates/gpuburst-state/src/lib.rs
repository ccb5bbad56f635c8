//! gpuburst-state — the job record store.
//!
//! Holds one [`JobRecord`] per submitted job for the lifetime of the
//! process. Records are created once, then mutated only through the
//! transition-checked operations on [`JobStore`]. Nothing is persisted: a
//! restart starts from an empty store.
//!
//! # Job state machine
//!
//! ```text
//! Starting ──→ ScalingUp ──→ WaitingForNodes ──→ Running ──→ Completed
//!    │             │               │                │
//!    └─────────────┴───────────────┴────────────────┴──→ Failed(error)
//! ```
//!
//! `Completed` and `Failed` are terminal. The scale-down timestamp is the
//! only field that may still be written after a terminal status.
//!
//! The `JobStore` is `Clone` + `Send` + `Sync` (backed by `Arc<RwLock<..>>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::JobStore;
pub use types::*;
