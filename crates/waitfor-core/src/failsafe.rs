//! Failsafe watchdog — force-terminates the process if a wait runs
//! unexpectedly long despite the orchestrator's own timeout logic. A
//! blunt backstop, not part of the normal termination paths.

use std::process;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::error;

/// Arm the watchdog for a finite, positive retry budget.
///
/// The timer fires after `timeout × (retries + 1)` — the worst case the
/// attempt loop should ever need — and exits the process without
/// consulting the orchestrator. Returns `None` when the budget is zero
/// or unlimited; an unlimited wait has no worst case to enforce.
pub fn arm(timeout: Duration, retries: i64) -> Option<JoinHandle<()>> {
    if retries <= 0 {
        return None;
    }
    let attempts = u32::try_from(retries.saturating_add(1)).unwrap_or(u32::MAX);
    let deadline = timeout.checked_mul(attempts).unwrap_or(Duration::MAX);
    Some(tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        error!("failsafe timeout triggered, something is not right");
        process::exit(1);
    }))
}
