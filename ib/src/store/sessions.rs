//! Persisted session configs, stats, and cross-task history

use std::path::PathBuf;
use std::sync::Mutex;

use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use crate::domain::{Session, SessionStats, StepUsage};

const FILE_NAME: &str = "sessions.json";

pub struct SessionStore {
    path: PathBuf,
    inner: Mutex<Vec<Session>>,
}

impl SessionStore {
    /// Open the store in the given storage directory, loading any existing
    /// `sessions.json`.
    pub fn open(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = storage_dir.into();
        std::fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        let path = dir.join(FILE_NAME);

        let sessions = if path.exists() {
            let content = std::fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse sessions.json")?
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), count = sessions.len(), "Opened session store");
        Ok(Self {
            path,
            inner: Mutex::new(sessions),
        })
    }

    /// Create a new session with the given display name
    pub fn create(&self, name: &str) -> Result<Session> {
        let session = Session::new(name);
        let mut sessions = self.lock();
        sessions.push(session.clone());
        self.persist(&sessions)?;
        info!(id = %session.id, %name, "Created session");
        Ok(session)
    }

    /// Fetch the session named "default", creating it on first use
    pub fn get_or_create_default(&self) -> Result<Session> {
        {
            let sessions = self.lock();
            if let Some(s) = sessions.iter().find(|s| s.name == "default") {
                return Ok(s.clone());
            }
        }
        self.create("default")
    }

    /// All sessions, newest first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions = self.lock().clone();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<()> {
        self.update(id, |s| {
            s.name = name.to_string();
            s.touch();
        })
    }

    /// Flip the preferred headless flag; returns the new value
    pub fn toggle_headless(&self, id: &str) -> Result<bool> {
        let mut new_value = false;
        self.update(id, |s| {
            s.headless = !s.headless;
            new_value = s.headless;
            s.touch();
        })?;
        Ok(new_value)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Err(eyre!("No session with id {}", id));
        }
        self.persist(&sessions)?;
        info!(%id, "Deleted session");
        Ok(())
    }

    /// Mark whether a human is currently solving a block in this session.
    /// Runtime-only state, but persisted writes keep `updated_at` fresh.
    pub fn set_verifying(&self, id: &str, verifying: bool) -> Result<()> {
        self.update(id, |s| {
            s.is_verifying = verifying;
        })
    }

    /// Append a finished task's summary to the session history
    pub fn push_history(&self, id: &str, entry: &str) -> Result<()> {
        self.update(id, |s| s.push_history(entry))
    }

    /// Ordered summaries of prior successful tasks
    pub fn history(&self, id: &str) -> Vec<String> {
        self.lock()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.session_history.clone())
            .unwrap_or_default()
    }

    /// Fold one LLM call's usage into the session's rolling stats
    pub fn apply_usage(&self, id: &str, usage: &StepUsage) -> Result<SessionStats> {
        let mut stats = SessionStats::default();
        self.update(id, |s| {
            s.stats.tokens += usage.input_tokens + usage.output_tokens;
            s.stats.cached_tokens += usage.cached_tokens;
            s.stats.cost += usage.cost;
            s.stats.last_prompt_tokens = usage.input_tokens;
            stats = s.stats.clone();
        })?;
        Ok(stats)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| eyre!("No session with id {}", id))?;
        f(session);
        self.persist(&sessions)
    }

    fn persist(&self, sessions: &[Session]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(sessions)?)
            .context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace sessions.json")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Session>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
