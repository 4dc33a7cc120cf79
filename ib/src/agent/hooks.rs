//! TaskHooks - the callback seam between the scheduler and the agents
//!
//! The scheduler constructs one hooks value per task and threads it by
//! reference through planner, executor, and watchdog. Everything the
//! agents need to report - steps, token usage, session history - goes
//! through here, so the agents stay ignorant of the stores.

use crate::domain::{StepUsage, TaskStep};

pub trait TaskHooks: Send + Sync {
    /// Append a step record and persist it
    fn record_step(&self, step: TaskStep);

    /// Fold one LLM call into the task aggregate and session stats.
    /// Called exactly once per LLM call.
    fn record_usage(&self, usage: StepUsage);

    /// Append a finished task's summary to the session history
    fn append_history(&self, entry: &str);

    /// Ordered summaries of prior successful tasks in this session
    fn session_history(&self) -> Vec<String>;

    /// Mark whether a human is currently solving a block for this session
    fn set_verifying(&self, verifying: bool);
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Records everything, backed by vectors, for unit tests
    #[derive(Default)]
    pub struct RecordingHooks {
        pub steps: Mutex<Vec<TaskStep>>,
        pub usages: Mutex<Vec<StepUsage>>,
        pub history_entries: Mutex<Vec<String>>,
        pub session_history: Mutex<Vec<String>>,
        pub verifying: Mutex<Vec<bool>>,
    }

    impl RecordingHooks {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_session_history(history: Vec<String>) -> Self {
            Self {
                session_history: Mutex::new(history),
                ..Self::default()
            }
        }

        pub fn steps(&self) -> Vec<TaskStep> {
            self.steps.lock().unwrap().clone()
        }

        pub fn usages(&self) -> Vec<StepUsage> {
            self.usages.lock().unwrap().clone()
        }

        pub fn history_entries(&self) -> Vec<String> {
            self.history_entries.lock().unwrap().clone()
        }

        pub fn verifying_transitions(&self) -> Vec<bool> {
            self.verifying.lock().unwrap().clone()
        }
    }

    impl TaskHooks for RecordingHooks {
        fn record_step(&self, step: TaskStep) {
            self.steps.lock().unwrap().push(step);
        }

        fn record_usage(&self, usage: StepUsage) {
            self.usages.lock().unwrap().push(usage);
        }

        fn append_history(&self, entry: &str) {
            self.history_entries.lock().unwrap().push(entry.to_string());
        }

        fn session_history(&self) -> Vec<String> {
            self.session_history.lock().unwrap().clone()
        }

        fn set_verifying(&self, verifying: bool) {
            self.verifying.lock().unwrap().push(verifying);
        }
    }
}
