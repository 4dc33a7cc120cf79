//! Scheduler implementation
//!
//! Each submitted task becomes an independent worker. Admission is FIFO
//! through a fair semaphore capped at the configured concurrency; a
//! per-session mutex then serializes tasks that share a browser. Every
//! worker owns a cancellation token consulted at each loop boundary and
//! long wait; `stop` trips it whether the task is queued or running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use eyre::{Result, eyre};
use memstore::MemoryStore;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use crate::accounting::TokenAccounting;
use crate::agent::{Executor, PlanOutcome, Planner, TaskHooks, Watchdog};
use crate::browser::{BrowserAgent, PageDriver};
use crate::config::ModelsConfig;
use crate::domain::{Session, StepUsage, Task, TaskStatus, TaskStep};
use crate::events::{EventBus, LogLevel};
use crate::llm::{ChatClient, MessageLog};
use crate::store::{SessionStore, TaskStore};

/// Error recorded on cancelled tasks
const USER_ABORTED: &str = "User aborted";

/// Creates a fresh driver for each session's browser agent
pub type DriverFactory = Arc<dyn Fn() -> Arc<dyn PageDriver> + Send + Sync>;

/// Everything the scheduler wires together
pub struct SchedulerDeps {
    pub tasks: Arc<TaskStore>,
    pub sessions: Arc<SessionStore>,
    pub memory: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub chat: Arc<dyn ChatClient>,
    pub audit: Arc<MessageLog>,
    pub storage_dir: PathBuf,
    pub driver_factory: DriverFactory,
}

struct Inner {
    models: ModelsConfig,
    tasks: Arc<TaskStore>,
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    chat: Arc<dyn ChatClient>,
    audit: Arc<MessageLog>,
    accounting: TokenAccounting,
    storage_dir: PathBuf,
    driver_factory: DriverFactory,
    semaphore: Arc<Semaphore>,
    /// Cancel token per task still queued or running
    cancels: Mutex<HashMap<String, CancellationToken>>,
    /// One mutex per session: tasks sharing a browser run serially
    session_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// One browser agent per session, living across its tasks
    browsers: AsyncMutex<HashMap<String, Arc<BrowserAgent>>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, models: ModelsConfig, deps: SchedulerDeps) -> Self {
        let accounting = TokenAccounting::new(deps.sessions.clone(), deps.bus.clone());
        Self {
            inner: Arc::new(Inner {
                models,
                tasks: deps.tasks,
                sessions: deps.sessions,
                memory: deps.memory,
                bus: deps.bus,
                chat: deps.chat,
                audit: deps.audit,
                accounting,
                storage_dir: deps.storage_dir,
                driver_factory: deps.driver_factory,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                cancels: Mutex::new(HashMap::new()),
                session_locks: Mutex::new(HashMap::new()),
                browsers: AsyncMutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a pending task, persist it, and enqueue a worker. Returns
    /// the task id.
    pub fn submit(&self, session_id: &str, goal: &str) -> Result<String> {
        let session = self
            .inner
            .sessions
            .get(session_id)
            .ok_or_else(|| eyre!("No session with id {}", session_id))?;

        let task = self.inner.tasks.create(session_id, goal)?;
        let task_id = task.id.clone();
        let token = CancellationToken::new();
        self.inner
            .cancels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.clone(), token.clone());

        info!(%task_id, %session_id, "Task submitted");
        self.inner
            .bus
            .log(LogLevel::Info, format!("task submitted: {}", task.goal));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_job(task, session, token).await;
        });

        Ok(task_id)
    }

    /// Signal cancellation. Queued workers short-circuit on dequeue;
    /// running workers stop at their next suspension point. Returns false
    /// when the task has already reached a terminal state.
    pub fn stop(&self, task_id: &str) -> bool {
        let cancels = self.inner.cancels.lock().unwrap_or_else(|e| e.into_inner());
        match cancels.get(task_id) {
            Some(token) => {
                info!(%task_id, "Stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// All tasks, newest first
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.tasks.tasks()
    }
}

impl Inner {
    async fn run_job(self: Arc<Self>, task: Task, session: Session, token: CancellationToken) {
        let task_id = task.id.clone();

        // Admission: wait FIFO for a worker slot, unless cancelled first
        let permit = tokio::select! {
            _ = token.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        };

        // Gate: a cancel before start finalizes without running
        if permit.is_none() || token.is_cancelled() {
            self.finalize(&task_id, TaskStatus::Cancelled, None, None, Some(USER_ABORTED.to_string()));
            self.forget(&task_id);
            return;
        }
        let _permit = permit;

        // Tasks sharing a session share a browser: run them serially
        let session_lock = self.session_lock(&session.id);
        let guard = tokio::select! {
            _ = token.cancelled() => None,
            guard = session_lock.lock_owned() => Some(guard),
        };
        if guard.is_none() {
            self.finalize(&task_id, TaskStatus::Cancelled, None, None, Some(USER_ABORTED.to_string()));
            self.forget(&task_id);
            return;
        }
        let _guard = guard;

        // Run
        if let Err(e) = self.tasks.set_running(&task_id) {
            warn!(error = %e, %task_id, "Failed to persist running transition");
        }
        self.bus.log(LogLevel::Info, format!("task started: {}", task.goal));
        debug!(%task_id, session_id = %session.id, "Worker started");

        let hooks = SchedulerHooks {
            inner: self.clone(),
            task_id: task_id.clone(),
            session_id: session.id.clone(),
        };
        let planner = self.build_planner(&task, &session).await;
        let outcome = planner.run(&task.goal, &token, &hooks).await;

        match outcome {
            PlanOutcome::Completed { answer, url } => {
                self.bus.log(LogLevel::Info, format!("task completed: {}", answer));
                self.finalize(&task_id, TaskStatus::Completed, Some(answer), Some(url), None);
            }
            PlanOutcome::Cancelled => {
                self.bus.log(LogLevel::Warn, "task cancelled".to_string());
                self.finalize(&task_id, TaskStatus::Cancelled, None, None, Some(USER_ABORTED.to_string()));
            }
            PlanOutcome::Failed(message) => {
                // an abort that surfaced as a failure is still a cancel
                if token.is_cancelled() {
                    self.finalize(&task_id, TaskStatus::Cancelled, None, None, Some(USER_ABORTED.to_string()));
                } else {
                    self.bus.log(LogLevel::Error, format!("task failed: {}", message));
                    self.finalize(&task_id, TaskStatus::Failed, None, None, Some(message));
                }
            }
        }

        self.forget(&task_id);
    }

    async fn build_planner(&self, task: &Task, session: &Session) -> Planner {
        let browser = self.browser_for(session).await;
        let watchdog = Watchdog::new(
            self.chat.clone(),
            self.models.watchdog_agent.clone(),
            self.memory.clone(),
            self.audit.clone(),
            session.id.clone(),
        );
        let executor = Executor::new(
            self.chat.clone(),
            self.models.executor_agent.clone(),
            self.audit.clone(),
            browser,
            watchdog,
            session.id.clone(),
            session.headless,
        );
        Planner::new(
            self.chat.clone(),
            self.models.planner_agent.clone(),
            self.audit.clone(),
            self.memory.clone(),
            self.bus.clone(),
            executor,
            task.id.clone(),
            session.id.clone(),
            session.headless,
        )
    }

    /// One browser per session, created on first use and kept across
    /// tasks so logins and cookies survive.
    async fn browser_for(&self, session: &Session) -> Arc<BrowserAgent> {
        let mut browsers = self.browsers.lock().await;
        browsers
            .entry(session.id.clone())
            .or_insert_with(|| {
                Arc::new(BrowserAgent::new(
                    session.id.clone(),
                    self.storage_dir.clone(),
                    (self.driver_factory)(),
                    session.headless,
                ))
            })
            .clone()
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.session_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn finalize(&self, task_id: &str, status: TaskStatus, result: Option<String>, url: Option<String>, error: Option<String>) {
        if let Err(e) = self.tasks.finalize(task_id, status, result, url, error) {
            warn!(error = %e, %task_id, "Failed to persist terminal transition");
        }
    }

    fn forget(&self, task_id: &str) {
        self.cancels.lock().unwrap_or_else(|e| e.into_inner()).remove(task_id);
    }
}

/// The per-task hooks value threaded down through planner, executor, and
/// watchdog. All durable writes happen here.
struct SchedulerHooks {
    inner: Arc<Inner>,
    task_id: String,
    session_id: String,
}

impl TaskHooks for SchedulerHooks {
    fn record_step(&self, step: TaskStep) {
        self.inner
            .bus
            .log(LogLevel::Info, format!("{} step {}: {}", step.agent, step.step, step.command));
        if let Err(e) = self.inner.tasks.append_step(&self.task_id, step) {
            warn!(error = %e, task_id = %self.task_id, "Failed to persist step");
        }
    }

    fn record_usage(&self, usage: StepUsage) {
        if let Err(e) = self.inner.tasks.add_usage(&self.task_id, &usage) {
            warn!(error = %e, task_id = %self.task_id, "Failed to persist task usage");
        }
        if let Err(e) = self.inner.accounting.record(&self.session_id, &usage) {
            warn!(error = %e, session_id = %self.session_id, "Failed to update session stats");
        }
    }

    fn append_history(&self, entry: &str) {
        if let Err(e) = self.inner.sessions.push_history(&self.session_id, entry) {
            warn!(error = %e, session_id = %self.session_id, "Failed to append session history");
        }
    }

    fn session_history(&self) -> Vec<String> {
        self.inner.sessions.history(&self.session_id)
    }

    fn set_verifying(&self, verifying: bool) {
        if let Err(e) = self.inner.sessions.set_verifying(&self.session_id, verifying) {
            warn!(error = %e, session_id = %self.session_id, "Failed to update verifying flag");
        }
    }
}
