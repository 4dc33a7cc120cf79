//! LLM request/response audit trail
//!
//! Every call is written under
//! `message/<session>/<agent>/msg_<yyyymmdd_hhmmss>.json` so a session's
//! full model traffic can be replayed after the fact. Audit failures are
//! logged and swallowed; they never fail the task.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::warn;

use super::{ChatRequest, ChatResponse};
use crate::domain::AgentKind;

pub struct MessageLog {
    root: PathBuf,
}

impl MessageLog {
    /// `root` is the storage directory; files land under `root/message/`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write one request/response pair. Returns the file path.
    pub fn record(
        &self,
        session_id: &str,
        agent: AgentKind,
        request: &ChatRequest,
        response: &ChatResponse,
    ) -> Result<PathBuf> {
        let dir = self.root.join("message").join(session_id).join(agent.as_str());
        std::fs::create_dir_all(&dir).context("Failed to create message dir")?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = unique_path(&dir, &format!("msg_{}", stamp));

        let payload = serde_json::json!({
            "model": request.model,
            "system": request.system,
            "messages": request.messages,
            "schema_name": request.schema_name,
            "response": response.content,
            "usage": response.usage,
            "recorded_at": crate::domain::now_ms(),
        });
        std::fs::write(&path, serde_json::to_string_pretty(&payload)?)
            .context(format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Best-effort record: failures are logged, not propagated
    pub fn record_quietly(&self, session_id: &str, agent: AgentKind, request: &ChatRequest, response: &ChatResponse) {
        if let Err(e) = self.record(session_id, agent, request, response) {
            warn!(error = %e, %session_id, agent = %agent, "Failed to write message audit");
        }
    }
}

/// Two calls within the same second get `_1`, `_2`, ... suffixes instead
/// of overwriting.
fn unique_path(dir: &Path, base: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.json", base));
    if !candidate.exists() {
        return candidate;
    }
    for n in 1.. {
        let candidate = dir.join(format!("{}_{}.json", base, n));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, TokenUsage};

    fn pair() -> (ChatRequest, ChatResponse) {
        (
            ChatRequest {
                model: "m".to_string(),
                system: "sys".to_string(),
                messages: vec![ChatMessage::user("hello")],
                schema_name: "test".to_string(),
                schema: serde_json::json!({}),
            },
            ChatResponse {
                content: "{\"ok\": true}".to_string(),
                usage: TokenUsage::default(),
            },
        )
    }

    #[test]
    fn test_record_writes_under_session_and_agent() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path());
        let (req, resp) = pair();

        let path = log.record("sess-1", AgentKind::Planner, &req, &resp).unwrap();
        assert!(path.starts_with(dir.path().join("message").join("sess-1").join("planner")));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("msg_"));

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["model"], "m");
        assert_eq!(written["response"], "{\"ok\": true}");
    }

    #[test]
    fn test_same_second_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path());
        let (req, resp) = pair();

        let a = log.record("s", AgentKind::Watchdog, &req, &resp).unwrap();
        let b = log.record("s", AgentKind::Watchdog, &req, &resp).unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
    }
}
