//! Completion backend trait, retry helper, and test mock.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network, rate limit). Non-retryable
/// errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        backend = backend_name,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Internal("retry loop without attempts".into())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for completion-backend providers.
///
/// Implementations connect to a concrete LLM service. The agent core only
/// ever sees this trait: messages and per-request tool definitions in, text
/// and/or tool-use blocks out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is reachable and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across tasks.
pub type SharedBackend = Arc<dyn CompletionBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic backend for testing.
///
/// Returns pre-scripted responses in order and records every request it
/// receives, so tests can assert on exactly what the agent sent.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
    request_log: std::sync::Mutex<Vec<CompletionRequest>>,
    unreachable: bool,
}

impl MockBackend {
    /// Create a mock backend with the given scripted responses.
    ///
    /// Responses are consumed in order; once exhausted, further requests
    /// return a backend error.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: std::sync::Mutex::new(responses),
            request_log: std::sync::Mutex::new(Vec::new()),
            unreachable: false,
        }
    }

    /// Create a mock backend that returns a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::text_only(text)])
    }

    /// Create a mock backend where every call fails as unreachable.
    pub fn unreachable() -> Self {
        Self {
            name: "mock-unreachable".to_string(),
            responses: std::sync::Mutex::new(Vec::new()),
            request_log: std::sync::Mutex::new(Vec::new()),
            unreachable: true,
        }
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if self.unreachable {
            return Err(LlmError::Network("mock backend unreachable".to_string()));
        }

        self.request_log.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        if self.unreachable {
            return Err(LlmError::Network("mock backend unreachable".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Message, StopReason, Usage};

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text(), "Hello!");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_responses_in_order() {
        let backend = MockBackend::new(vec![
            CompletionResponse::text_only("First"),
            CompletionResponse::text_only("Second"),
        ]);

        let r1 = backend
            .complete(CompletionRequest::new("m", vec![Message::user("1")], 10))
            .await
            .unwrap();
        let r2 = backend
            .complete(CompletionRequest::new("m", vec![Message::user("2")], 10))
            .await
            .unwrap();

        assert_eq!(r1.text(), "First");
        assert_eq!(r2.text(), "Second");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockBackend::new(vec![]);
        let result = backend
            .complete(CompletionRequest::new("m", vec![Message::user("Hi")], 10))
            .await;
        assert!(matches!(result, Err(LlmError::Backend(_))));
    }

    #[tokio::test]
    async fn test_mock_backend_unreachable() {
        let backend = MockBackend::unreachable();
        let result = backend
            .complete(CompletionRequest::new("m", vec![Message::user("Hi")], 10))
            .await;
        assert!(matches!(result, Err(ref e) if e.is_unreachable()));
        assert!(backend.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_tool_use_response() {
        let backend = MockBackend::new(vec![CompletionResponse::new(
            "msg_1",
            "model",
            vec![ContentBlock::tool_use(
                "call_1",
                "bank_lookup",
                serde_json::json!({"name": "Acme Bank"}),
            )],
            StopReason::ToolUse,
            Usage::new(50, 30),
        )]);

        let response = backend
            .complete(CompletionRequest::new("m", vec![Message::user("look up")], 10))
            .await
            .unwrap();

        assert!(response.has_tool_use());
        assert_eq!(response.tool_calls()[0].name, "bank_lookup");
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_fatal() {
        let mut calls = 0u32;
        let result: Result<()> = with_retry(3, Duration::from_millis(1), "test", || {
            calls += 1;
            async { Err(LlmError::Auth("nope".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient() {
        let mut calls = 0u32;
        let result = with_retry(2, Duration::from_millis(1), "test", || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(LlmError::Network("flaky".to_string()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }
}
