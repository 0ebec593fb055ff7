//! The capability contract every protocol waiter implements.

use async_trait::async_trait;

use crate::error::WaitResult;

/// One protocol family's connect/test/cancel lifecycle.
///
/// A waiter is constructed fresh for every attempt and driven exactly
/// once: `connect`, then `run_test` if `connect` succeeded, then
/// `cancel` unless the attempt succeeded. Each operation may block up
/// to the caller's per-attempt timeout; the orchestrator enforces the
/// deadline from outside.
#[async_trait]
pub trait Waiter: Send {
    /// Establish whatever session the protocol needs, using the resolved
    /// host, port, and credentials, honoring the insecure-transport flag.
    async fn connect(&mut self) -> WaitResult<()>;

    /// Run the optional existence check; a no-op when none is configured.
    async fn run_test(&mut self) -> WaitResult<()>;

    /// Release anything `connect` acquired. Must be idempotent and safe
    /// to call when `connect` never ran or failed before acquiring
    /// resources.
    async fn cancel(&mut self) -> WaitResult<()>;
}

impl std::fmt::Debug for dyn Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Waiter")
    }
}
