//! waitfor-core — wait for a network dependency to become ready.
//!
//! Polls an endpoint (HTTP/S, redis, postgres, mysql) until it is
//! reachable and an optional existence check passes, then returns. Used
//! as a startup gate: wait for dependency X before starting Y.
//!
//! # Architecture
//!
//! ```text
//! Target (orchestrator)
//!   ├── resolve: parse address → host/port → check scheme
//!   ├── Registry: scheme → waiter factory (fresh waiter per attempt)
//!   └── attempt loop
//!       ├── connect + run_test raced against the per-attempt timeout
//!       ├── cancel on failure or timeout
//!       └── retry with a lower-bounded inter-attempt delay
//! ```
//!
//! The failsafe watchdog is a separate, optional backstop the binary can
//! arm; it never participates in the attempt loop.

pub mod adapters;
pub mod error;
pub mod failsafe;
pub mod hostport;
pub mod registry;
pub mod target;
pub mod waiter;

pub use error::{WaitError, WaitResult};
pub use registry::Registry;
pub use target::{Config, ResolvedTarget, Target};
pub use waiter::Waiter;
