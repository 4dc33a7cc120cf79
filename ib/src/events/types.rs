//! Event vocabulary shared between the core and the UI layer

use serde::{Deserialize, Serialize};

use crate::domain::now_ms;

/// Severity for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Everything the core publishes (or consumes) over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Free-form activity line for the UI's log pane
    Log {
        message: String,
        level: LogLevel,
        timestamp: i64,
    },

    /// The watchdog found a block a human must solve; the browser has been
    /// switched to GUI mode
    VerificationNeeded {
        session_id: String,
        reason: String,
        url: String,
    },

    /// The human reports the block solved (emitted by the UI layer)
    VerificationResolved { session_id: String },

    /// A session's rolling token/cost stats changed
    SessionStatsUpdated { session_id: String },
}

impl Event {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            level,
            timestamp: now_ms(),
        }
    }

    /// Event type name for display and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::VerificationNeeded { .. } => "verification_needed",
            Self::VerificationResolved { .. } => "verification_resolved",
            Self::SessionStatsUpdated { .. } => "session:stats-updated",
        }
    }
}
