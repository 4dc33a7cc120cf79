//! Session domain type
//!
//! A session is the unit of browser identity: it owns a persistent profile
//! directory (cookies, local storage, logins) keyed by its id, a rolling
//! token/cost tally, and the ordered history of prior successful tasks.

use serde::{Deserialize, Serialize};

use super::{generate_id, now_ms};

/// Rolling per-session counters, mutated only by the token-accounting
/// side-effect of LLM calls within this session's tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    /// Cumulative prompt + completion tokens
    pub tokens: u64,
    /// Cumulative cached prompt tokens
    pub cached_tokens: u64,
    /// Cumulative estimated cost in USD
    pub cost: f64,
    /// Prompt size of the most recent call, for the context-window gauge
    pub last_prompt_tokens: u64,
}

/// A browser identity with its own profile, stats, and task history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier; also keys the browser profile directory
    pub id: String,

    /// Display name, user-editable
    pub name: String,

    /// Preferred browser mode; the intervention handshake may override it
    /// temporarily at runtime
    pub headless: bool,

    /// Unix milliseconds
    pub created_at: i64,

    /// Unix milliseconds
    pub updated_at: i64,

    /// True while a human is solving a block in this session's browser.
    /// Runtime-only, never persisted.
    #[serde(skip)]
    pub is_verifying: bool,

    /// Rolling token/cost counters
    #[serde(default)]
    pub stats: SessionStats,

    /// Plain-text summaries of prior successful tasks, oldest first
    #[serde(default)]
    pub session_history: Vec<String>,
}

impl Session {
    /// Create a new session with a generated id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = now_ms();
        Self {
            id: generate_id("session", &name),
            name,
            headless: true,
            created_at: now,
            updated_at: now,
            is_verifying: false,
            stats: SessionStats::default(),
            session_history: Vec::new(),
        }
    }

    /// Record a finished task's summary in the session history
    pub fn push_history(&mut self, entry: impl Into<String>) {
        self.session_history.push(entry.into());
        self.updated_at = now_ms();
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}
