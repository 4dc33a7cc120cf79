//! ChatClient trait definition

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, LlmError};

/// Stateless JSON-mode chat transport. Each call is independent; the
/// agents rebuild their context from persisted state every step.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::llm::TokenUsage;

    /// Queue-driven mock for unit tests. Responses pop in FIFO order;
    /// every request is recorded so tests can assert on prompt contents.
    pub struct MockChat {
        responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockChat {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Queue a JSON reply with default usage
        pub fn push_json(&self, value: serde_json::Value) {
            self.push_json_with_usage(value, TokenUsage {
                prompt_tokens: 100,
                cached_tokens: 0,
                completion_tokens: 20,
            });
        }

        pub fn push_json_with_usage(&self, value: serde_json::Value, usage: TokenUsage) {
            self.responses.lock().unwrap().push_back(Ok(ChatResponse {
                content: value.to_string(),
                usage,
            }));
        }

        /// Queue a transport failure
        pub fn push_error(&self, message: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(LlmError::InvalidResponse(message.to_string())));
        }

        /// All requests seen so far
        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Default for MockChat {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ChatClient for MockChat {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::InvalidResponse("no more mock responses".to_string())))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_pops_in_order() {
            let mock = MockChat::new();
            mock.push_json(serde_json::json!({"n": 1}));
            mock.push_json(serde_json::json!({"n": 2}));

            let req = ChatRequest {
                model: "m".to_string(),
                system: "s".to_string(),
                messages: vec![],
                schema_name: "test".to_string(),
                schema: serde_json::json!({}),
            };

            let r1 = mock.chat(req.clone()).await.unwrap();
            let r2 = mock.chat(req.clone()).await.unwrap();
            assert!(r1.content.contains('1'));
            assert!(r2.content.contains('2'));
            assert_eq!(mock.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_errors_when_exhausted() {
            let mock = MockChat::new();
            let req = ChatRequest {
                model: "m".to_string(),
                system: "s".to_string(),
                messages: vec![],
                schema_name: "test".to_string(),
                schema: serde_json::json!({}),
            };
            assert!(mock.chat(req).await.is_err());
        }
    }
}
