//! Deterministic chat stand-in for mock mode and integration tests
//!
//! Replies are routed by the request's schema name. Tests can queue
//! specific replies per schema; anything not queued falls back to a
//! built-in happy path that completes a task in one browser round.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatClient, ChatRequest, ChatResponse, LlmError, TokenUsage};

/// Fixed usage reported per scripted call, so cost-accounting tests have
/// stable numbers to assert against.
pub const SCRIPTED_USAGE: TokenUsage = TokenUsage {
    prompt_tokens: 120,
    cached_tokens: 0,
    completion_tokens: 40,
};

pub struct ScriptedChat {
    queued: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply for the next request with the given schema name
    pub fn push(&self, schema_name: &str, reply: serde_json::Value) {
        self.queued
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default()
            .push_back(reply);
    }

    /// All requests seen so far (for asserting on prompt contents)
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn default_reply(schema_name: &str, request: &ChatRequest) -> serde_json::Value {
        match schema_name {
            "extract_keywords" => serde_json::json!({"keywords": ["mock", "task"]}),
            "plan_step" => {
                // first round browses, every later round finishes
                let browsed = request.messages.iter().any(|m| m.content.contains("Result:"));
                if browsed {
                    serde_json::json!({
                        "thought": "the browser round answered the goal",
                        "command": "finish",
                        "input": {"answer": "mock answer"},
                    })
                } else {
                    serde_json::json!({
                        "thought": "need to look at the page",
                        "command": "browser",
                        "input": {"goal": "open the target page and read it"},
                    })
                }
            }
            "watchdog_check" => serde_json::json!({
                "is_stuck": false,
                "needs_intervention": false,
                "reason": "",
                "new_block_keywords": [],
            }),
            "executor_decision" => serde_json::json!({
                "thought": "the page already shows what we need",
                "action": "answer",
                "answer": "mock page content",
            }),
            "summarize_result" => serde_json::json!({
                "summary": "mock summary of the page",
                "extracted": {},
            }),
            _ => serde_json::json!({}),
        }
    }
}

impl Default for ScriptedChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let reply = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.schema_name)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Self::default_reply(&request.schema_name, &request));

        let response = ChatResponse {
            content: reply.to_string(),
            usage: SCRIPTED_USAGE,
        };
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(schema_name: &str) -> ChatRequest {
        ChatRequest {
            model: "scripted".to_string(),
            system: "s".to_string(),
            messages: vec![],
            schema_name: schema_name.to_string(),
            schema: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_queued_reply_wins_over_default() {
        let chat = ScriptedChat::new();
        chat.push("extract_keywords", serde_json::json!({"keywords": ["custom"]}));

        let r = chat.chat(request("extract_keywords")).await.unwrap();
        assert!(r.content.contains("custom"));

        // queue drained; default returns
        let r = chat.chat(request("extract_keywords")).await.unwrap();
        assert!(r.content.contains("mock"));
    }

    #[tokio::test]
    async fn test_default_plan_browses_then_finishes() {
        let chat = ScriptedChat::new();

        let first = chat.chat(request("plan_step")).await.unwrap();
        assert!(first.content.contains("browser"));

        let mut followup = request("plan_step");
        followup.messages.push(crate::llm::ChatMessage::user("Result: done\nURL: x"));
        let second = chat.chat(followup).await.unwrap();
        assert!(second.content.contains("finish"));
    }

    #[tokio::test]
    async fn test_usage_is_fixed() {
        let chat = ScriptedChat::new();
        let r = chat.chat(request("watchdog_check")).await.unwrap();
        assert_eq!(r.usage, SCRIPTED_USAGE);
    }
}
