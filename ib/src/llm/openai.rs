//! OpenAI-compatible chat completions client
//!
//! JSON mode only: every request carries a `response_format` with the
//! reply schema. Transient failures retry with exponential backoff; 429
//! surfaces as [`LlmError::RateLimited`] with the server's retry-after.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ChatClient, ChatRequest, ChatResponse, LlmError, TokenUsage};

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// Client for any OpenAI-compatible `/v1/chat/completions` endpoint
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAiChat {
    /// Build from resolved credentials. `base_url` has no trailing slash.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            http,
        })
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system,
        })];
        for msg in &request.messages {
            messages.push(serde_json::json!({
                "role": msg.role,
                "content": msg.content,
            }));
        }

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": true,
                },
            },
        })
    }

    fn parse_response(&self, api: ApiResponse) -> Result<ChatResponse, LlmError> {
        let content = api
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let usage = api.usage.unwrap_or_default();
        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                cached_tokens: usage.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
                completion_tokens: usage.completion_tokens,
            },
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(&request);
        debug!(model = %request.model, schema = %request.schema_name, "chat: sending request");

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "chat: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "chat: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let message = response.text().await.unwrap_or_default();
                debug!(attempt, status, "chat: retryable error");
                last_error = Some(LlmError::Api { status, message });
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Api { status, message });
            }

            let api: ApiResponse = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            return self.parse_response(api);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("retries exhausted".to_string())))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    prompt_tokens_details: Option<ApiPromptDetails>,
}

#[derive(Deserialize)]
struct ApiPromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn client() -> OpenAiChat {
        OpenAiChat::new("test-key", "https://api.example.com/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let c = client();
        assert_eq!(c.base_url, "https://api.example.com");
    }

    #[test]
    fn test_build_body_shape() {
        let c = client();
        let body = c.build_body(&ChatRequest {
            model: "gpt-5-mini".to_string(),
            system: "you are a test".to_string(),
            messages: vec![ChatMessage::user("hi")],
            schema_name: "reply".to_string(),
            schema: serde_json::json!({"type": "object"}),
        });

        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "reply");
    }

    #[test]
    fn test_parse_response_reads_cached_tokens() {
        let c = client();
        let api: ApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "{\"ok\": true}"}}],
            "usage": {
                "prompt_tokens": 200,
                "completion_tokens": 40,
                "prompt_tokens_details": {"cached_tokens": 150},
            },
        }))
        .unwrap();

        let response = c.parse_response(api).unwrap();
        assert_eq!(response.content, "{\"ok\": true}");
        assert_eq!(response.usage.prompt_tokens, 200);
        assert_eq!(response.usage.cached_tokens, 150);
        assert_eq!(response.usage.completion_tokens, 40);
    }

    #[test]
    fn test_parse_response_no_choices() {
        let c = client();
        let api: ApiResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(matches!(c.parse_response(api), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }
}
