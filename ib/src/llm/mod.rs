//! LLM client layer
//!
//! Every call in this system is a JSON-mode chat completion: a system
//! prompt, a short message list, and a schema the reply must satisfy.
//! The transport is opaque behind [`ChatClient`]; [`OpenAiChat`] talks to
//! any OpenAI-compatible endpoint, [`ScriptedChat`] is the deterministic
//! stand-in used by mock mode and the integration tests.

mod audit;
mod client;
mod openai;
mod scripted;

pub use audit::MessageLog;
pub use client::ChatClient;
#[cfg(test)]
pub use client::mock;
pub use openai::OpenAiChat;
pub use scripted::ScriptedChat;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Token counts reported by one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    /// Portion of the prompt served from the provider's cache
    pub cached_tokens: u64,
    pub completion_tokens: u64,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A JSON-mode completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// Name of the reply shape, also used to route scripted replies
    pub schema_name: String,
    /// JSON Schema the reply content must satisfy
    pub schema: serde_json::Value,
}

/// A completed call: raw JSON content plus usage
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// LLM transport errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

/// Parse a JSON-mode reply into a typed value. Malformed content follows
/// the LLM-fault path at the caller.
pub fn parse_reply<T: serde::de::DeserializeOwned>(response: &ChatResponse) -> Result<T, LlmError> {
    serde_json::from_str(response.content.trim())
        .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, truncate(&response.content, 200))))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "..."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug)]
    struct Reply {
        answer: String,
    }

    #[test]
    fn test_parse_reply_ok() {
        let response = ChatResponse {
            content: " {\"answer\": \"42\"} ".to_string(),
            usage: TokenUsage::default(),
        };
        let reply: Reply = parse_reply(&response).unwrap();
        assert_eq!(reply.answer, "42");
    }

    #[test]
    fn test_parse_reply_malformed() {
        let response = ChatResponse {
            content: "not json".to_string(),
            usage: TokenUsage::default(),
        };
        let err = parse_reply::<Reply>(&response).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
