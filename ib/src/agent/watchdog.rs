//! Watchdog - two-tier intervention and dead-loop detector
//!
//! Tier 1 is a free keyword scan against the page title and text plus a
//! hard-coded check for the search engine's challenge URL. Only when that
//! misses does tier 2 spend an LLM call. Confirmed interventions feed new
//! keywords back into the store, so the next block of the same kind is
//! caught by tier 1.

use std::sync::{Arc, Mutex};

use memstore::MemoryStore;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::accounting::step_usage;
use crate::domain::{AgentKind, PageSnapshot, StepUsage};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, MessageLog, parse_reply};
use crate::prompts;

/// The major search engine's sorry/challenge URL marker
pub const SORRY_URL_MARKER: &str = "google.com/sorry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Proceed,
    Intervention { reason: String },
}

/// Scan outcome plus any LLM usage spent on it. Tier-1 hits cost nothing
/// and carry no usage.
#[derive(Debug)]
pub struct WatchdogReport {
    pub verdict: WatchdogVerdict,
    pub usage: Option<StepUsage>,
}

impl WatchdogReport {
    fn free(verdict: WatchdogVerdict) -> Self {
        Self { verdict, usage: None }
    }
}

#[derive(Debug, Deserialize)]
struct WatchdogReply {
    #[serde(default)]
    is_stuck: bool,
    #[serde(default)]
    needs_intervention: bool,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    new_block_keywords: Vec<String>,
}

struct KeywordCache {
    keywords: Vec<String>,
    version: u64,
}

pub struct Watchdog {
    chat: Arc<dyn ChatClient>,
    model: String,
    memory: Arc<MemoryStore>,
    audit: Arc<MessageLog>,
    session_id: String,
    cache: Mutex<Option<KeywordCache>>,
}

impl Watchdog {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        model: impl Into<String>,
        memory: Arc<MemoryStore>,
        audit: Arc<MessageLog>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            memory,
            audit,
            session_id: session_id.into(),
            cache: Mutex::new(None),
        }
    }

    /// Screen one executor step. Never fails: store or LLM trouble
    /// degrades to `Proceed` so a flaky watchdog cannot kill a task.
    pub async fn check(&self, goal: &str, snapshot: &PageSnapshot, recent_steps: &[String]) -> WatchdogReport {
        if let Some(reason) = self.keyword_scan(snapshot) {
            debug!(%reason, "Watchdog tier-1 hit");
            return WatchdogReport::free(WatchdogVerdict::Intervention { reason });
        }
        self.llm_check(goal, snapshot, recent_steps).await
    }

    /// Tier 1: case-insensitive containment over title and content
    /// snippet, plus the challenge-URL pattern. No LLM usage.
    pub fn keyword_scan(&self, snapshot: &PageSnapshot) -> Option<String> {
        if snapshot.url.contains(SORRY_URL_MARKER) {
            return Some("search engine challenge page".to_string());
        }

        let keywords = self.cached_keywords();
        let title = snapshot.title.to_lowercase();
        let content = snapshot.content_snippet.to_lowercase();
        keywords
            .iter()
            .find(|kw| title.contains(kw.as_str()) || content.contains(kw.as_str()))
            .map(|kw| format!("page matches block keyword \"{}\"", kw))
    }

    /// Tier 2: one JSON-mode call. Transport or parse faults count as
    /// non-intervention.
    async fn llm_check(&self, goal: &str, snapshot: &PageSnapshot, recent_steps: &[String]) -> WatchdogReport {
        let tail: Vec<&str> = recent_steps
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(String::as_str)
            .collect();

        let user = format!(
            "Task goal: {}\n\nRecent steps:\n{}\n\nPage snapshot:\n{}",
            goal,
            if tail.is_empty() { "(none)".to_string() } else { tail.join("\n") },
            snapshot.render(),
        );

        let request = ChatRequest {
            model: self.model.clone(),
            system: prompts::WATCHDOG.to_string(),
            messages: vec![ChatMessage::user(user)],
            schema_name: prompts::SCHEMA_WATCHDOG.to_string(),
            schema: prompts::watchdog_schema(),
        };

        let response = match self.chat.chat(request.clone()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Watchdog LLM call failed, treating as non-intervention");
                return WatchdogReport::free(WatchdogVerdict::Proceed);
            }
        };
        self.audit
            .record_quietly(&self.session_id, AgentKind::Watchdog, &request, &response);
        let usage = Some(step_usage(&self.model, &response.usage));

        let reply: WatchdogReply = match parse_reply(&response) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Watchdog reply malformed, treating as non-intervention");
                return WatchdogReport {
                    verdict: WatchdogVerdict::Proceed,
                    usage,
                };
            }
        };

        if reply.needs_intervention {
            self.learn(snapshot, &reply);
            return WatchdogReport {
                verdict: WatchdogVerdict::Intervention {
                    reason: nonempty(reply.reason, "page requires human verification"),
                },
                usage,
            };
        }

        if reply.is_stuck {
            return WatchdogReport {
                verdict: WatchdogVerdict::Intervention {
                    reason: nonempty(reply.reason, "agent is repeating the same action with no progress"),
                },
                usage,
            };
        }

        WatchdogReport {
            verdict: WatchdogVerdict::Proceed,
            usage,
        }
    }

    /// Self-learning: store the model's keywords, then tokenize the title
    /// and reason for extra markers. The store bumps its version, which
    /// invalidates every cached list including ours.
    fn learn(&self, snapshot: &PageSnapshot, reply: &WatchdogReply) {
        for kw in &reply.new_block_keywords {
            if let Err(e) = self.memory.add_bot_keyword(kw) {
                warn!(error = %e, %kw, "Failed to store bot keyword");
            }
        }
        let text = format!("{} {}", snapshot.title, reply.reason);
        if let Err(e) = self.memory.add_bot_keywords_from_text(&text) {
            warn!(error = %e, "Failed to store tokenized bot keywords");
        }
    }

    fn cached_keywords(&self) -> Vec<String> {
        let current = self.memory.version();
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(c) = cache.as_ref()
            && c.version == current
        {
            return c.keywords.clone();
        }

        match self.memory.get_bot_keywords() {
            Ok(keywords) => {
                *cache = Some(KeywordCache {
                    keywords: keywords.clone(),
                    version: current,
                });
                keywords
            }
            Err(e) => {
                warn!(error = %e, "Failed to load bot keywords, scanning with stale list");
                cache.as_ref().map(|c| c.keywords.clone()).unwrap_or_default()
            }
        }
    }
}

fn nonempty(s: String, fallback: &str) -> String {
    if s.trim().is_empty() { fallback.to_string() } else { s }
}
