//! Persisted task records with step traces

use std::path::PathBuf;
use std::sync::Mutex;

use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use crate::domain::{StepUsage, Task, TaskStatus, TaskStep, now_ms};

const FILE_NAME: &str = "tasks.json";

/// Fixed error written into tasks found non-terminal on load
pub const RESTART_ERROR: &str = "interrupted by process restart";

pub struct TaskStore {
    path: PathBuf,
    inner: Mutex<Vec<Task>>,
}

impl TaskStore {
    /// Open the store, loading `tasks.json` and rewriting any task left in
    /// pending/running to failed. That rewrite is the only non-idempotent
    /// step of initialization.
    pub fn open(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = storage_dir.into();
        std::fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        let path = dir.join(FILE_NAME);

        let mut tasks: Vec<Task> = if path.exists() {
            let content = std::fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse tasks.json")?
        } else {
            Vec::new()
        };

        let mut interrupted = 0;
        for task in tasks.iter_mut() {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Failed;
                task.error = Some(RESTART_ERROR.to_string());
                task.completed_at = Some(now_ms());
                interrupted += 1;
            }
        }

        let store = Self {
            path,
            inner: Mutex::new(tasks),
        };
        if interrupted > 0 {
            warn!(interrupted, "Marked in-flight tasks failed after restart");
            let tasks = store.lock();
            store.persist(&tasks)?;
        }
        Ok(store)
    }

    /// Create and persist a pending task
    pub fn create(&self, session_id: &str, goal: &str) -> Result<Task> {
        let task = Task::new(session_id, goal);
        let mut tasks = self.lock();
        tasks.push(task.clone());
        self.persist(&tasks)?;
        info!(id = %task.id, %session_id, "Created task");
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    /// All tasks, newest first by creation time
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks = self.lock().clone();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Transition pending → running
    pub fn set_running(&self, id: &str) -> Result<()> {
        self.update(id, |t| {
            t.status = TaskStatus::Running;
        })
    }

    /// Set the terminal status exactly once. A second call is a no-op so a
    /// cancel racing completion cannot flip the recorded outcome.
    pub fn finalize(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
        url: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(eyre!("finalize called with non-terminal status {}", status));
        }
        self.update(id, |t| {
            if t.status.is_terminal() {
                debug!(%id, current = %t.status, attempted = %status, "Ignoring second terminal transition");
                return;
            }
            t.status = status;
            t.result = result;
            t.url = url;
            t.error = error;
            t.completed_at = Some(now_ms());
        })
    }

    /// Append a step and persist immediately
    pub fn append_step(&self, id: &str, step: TaskStep) -> Result<()> {
        self.update(id, |t| t.steps.push(step))
    }

    /// Fold one LLM call into the task aggregate
    pub fn add_usage(&self, id: &str, usage: &StepUsage) -> Result<()> {
        self.update(id, |t| t.token_usage.add(usage))
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Task)) -> Result<()> {
        let mut tasks = self.lock();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| eyre!("No task with id {}", id))?;
        f(task);
        self.persist(&tasks)
    }

    fn persist(&self, tasks: &[Task]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(tasks)?)
            .context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace tasks.json")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
