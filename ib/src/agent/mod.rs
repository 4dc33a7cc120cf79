//! The three-role agent control loop
//!
//! - [`Planner`] decomposes the goal and drives the executor; it never
//!   sees page state.
//! - [`Executor`] runs the snapshot → decision → action loop against the
//!   browser and compresses the outcome for the planner.
//! - [`Watchdog`] screens every executor step for blocks and dead loops,
//!   keyword scan first, LLM second.
//!
//! All three report through [`TaskHooks`] and honor the task's cancel
//! token at every suspension point.

mod executor;
mod hooks;
mod planner;
mod watchdog;

pub use executor::{EXECUTOR_MAX_STEPS, ExecOutcome, Executor, MANUAL_LOGIN_GOAL, MANUAL_LOGIN_WINDOW};
pub use hooks::TaskHooks;
#[cfg(test)]
pub use hooks::test_support;
pub use planner::{PLANNER_MAX_STEPS, PlanOutcome, Planner};
pub use watchdog::{SORRY_URL_MARKER, Watchdog, WatchdogReport, WatchdogVerdict};

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep unless cancelled first. Returns false when the token fired.
pub(crate) async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_cancellable_completes() {
        let cancel = CancellationToken::new();
        assert!(sleep_cancellable(Duration::from_millis(5), &cancel).await);
    }

    #[tokio::test]
    async fn test_sleep_cancellable_interrupted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_cancellable(Duration::from_secs(60), &cancel).await);
    }
}
