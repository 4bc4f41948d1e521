//! OpenAI-compatible API backend.
//!
//! Connects to OpenAI's chat-completions API or any compatible service
//! (vLLM, Ollama, gateway proxies). Tool calling maps onto the
//! function-calling wire format.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::{with_retry, CompletionBackend};
use crate::error::{LlmError, Result};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, Usage,
};

/// Default OpenAI API base URL.
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (optional for local services).
    pub api_key: Option<String>,
    /// Base URL for the API.
    pub base_url: String,
    /// Model override (takes precedence over the request's model).
    pub model: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries for transient errors.
    pub max_retries: u32,
    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
    /// Name for this backend instance.
    pub name: String,
}

impl OpenAiConfig {
    /// Create a config for the hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: "openai".to_string(),
        }
    }

    /// Create a config from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LlmError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::openai(api_key))
    }

    /// Create a config for a local OpenAI-compatible service without auth.
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            model: None,
            timeout: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: "local".to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// Arguments as a JSON-encoded string, per the OpenAI wire format.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    id: String,
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible completion backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create a backend from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url)
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");
        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    /// Convert a [`CompletionRequest`] to the chat-completions wire format.
    fn to_wire_request(&self, request: &CompletionRequest) -> WireChatRequest {
        let mut messages: Vec<WireMessage> = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in &request.messages {
            push_wire_message(&mut messages, m);
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| WireTool {
                        tool_type: "function".to_string(),
                        function: WireFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| request.model.clone());

        WireChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            tools,
        }
    }

    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.text().await?;
        let parsed: WireChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Serialization(e.to_string()))?;

        from_wire_response(parsed)
    }

    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(error) = serde_json::from_str::<WireErrorResponse>(&body) {
            match status.as_u16() {
                401 => LlmError::Auth(error.error.message),
                429 => LlmError::RateLimit(error.error.message),
                500..=599 => LlmError::Backend(format!("Server error: {}", error.error.message)),
                _ => LlmError::Backend(error.error.message),
            }
        } else {
            LlmError::Backend(format!("HTTP {}: {}", status, body))
        }
    }
}

/// Flatten one provider-agnostic message into wire messages.
///
/// Tool results become separate "tool" role messages; assistant tool-use
/// blocks become `tool_calls` entries on the assistant message.
fn push_wire_message(messages: &mut Vec<WireMessage>, m: &Message) {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<WireToolCall> = Vec::new();
    let mut tool_results: Vec<(String, String)> = Vec::new();

    for block in &m.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(WireToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: WireFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_default(),
                },
            }),
            ContentBlock::ToolResult {
                tool_call_id,
                content,
                ..
            } => tool_results.push((tool_call_id.clone(), content.clone())),
        }
    }

    for (tool_call_id, content) in tool_results {
        messages.push(WireMessage {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        });
    }

    let text: String = text_parts.concat();
    if !tool_calls.is_empty() {
        messages.push(WireMessage {
            role: "assistant".to_string(),
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        });
    } else if !text.is_empty() || m.content.is_empty() {
        messages.push(WireMessage {
            role: match m.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: Some(text),
            tool_calls: None,
            tool_call_id: None,
        });
    }
}

/// Convert a wire response back into a [`CompletionResponse`].
fn from_wire_response(parsed: WireChatResponse) -> Result<CompletionResponse> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Backend("response contained no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::text(text));
        }
    }

    if let Some(calls) = choice.message.tool_calls {
        for call in calls {
            let input: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| {
                    LlmError::Serialization(format!(
                        "tool call '{}' has malformed arguments: {}",
                        call.function.name, e
                    ))
                })?;
            content.push(ContentBlock::tool_use(call.id, call.function.name, input));
        }
    }

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    let usage = parsed
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CompletionResponse::new(
        parsed.id,
        parsed.model,
        content,
        stop_reason,
        usage,
    ))
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let wire_request = self.to_wire_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %wire_request.model,
            messages = wire_request.messages.len(),
            tools = wire_request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending chat-completions request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .add_headers(self.client.post(self.completions_url()))
                    .json(&wire_request)
                    .send()
                    .await?;

                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .add_headers(self.client.get(self.models_url()))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::Backend(format!(
                "health check failed with HTTP {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDefinition;

    fn test_backend() -> OpenAiBackend {
        OpenAiBackend::new(OpenAiConfig::local("http://localhost:9999/v1")).unwrap()
    }

    #[test]
    fn test_wire_request_includes_system_and_tools() {
        let backend = test_backend();
        let request = CompletionRequest::new("gpt-4o-mini", vec![Message::user("hi")], 256)
            .with_system("You are a router.")
            .with_tools(vec![ToolDefinition::new(
                "bank_lookup",
                "Look up a bank",
                serde_json::json!({"type": "object", "properties": {}}),
            )]);

        let wire = backend.to_wire_request(&request);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.tools.as_ref().unwrap().len(), 1);
        assert_eq!(wire.tools.as_ref().unwrap()[0].function.name, "bank_lookup");
    }

    #[test]
    fn test_wire_request_model_override() {
        let backend =
            OpenAiBackend::new(OpenAiConfig::local("http://x/v1").with_model("forced")).unwrap();
        let request = CompletionRequest::new("requested", vec![Message::user("hi")], 10);
        assert_eq!(backend.to_wire_request(&request).model, "forced");
    }

    #[test]
    fn test_wire_message_tool_flattening() {
        let backend = test_backend();
        let request = CompletionRequest::new(
            "m",
            vec![
                Message::user("look up Acme"),
                Message::assistant_blocks(vec![ContentBlock::tool_use(
                    "call_1",
                    "bank_lookup",
                    serde_json::json!({"name": "Acme"}),
                )]),
                Message::tool_result("call_1", "{\"rssd\": 12345}", false),
            ],
            10,
        );

        let wire = backend.to_wire_request(&request);
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[1].role, "assistant");
        assert!(wire.messages[1].tool_calls.is_some());
        assert_eq!(wire.messages[2].role, "tool");
        assert_eq!(wire.messages[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_from_wire_response_with_tool_call() {
        let parsed: WireChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "bank_lookup", "arguments": "{\"name\":\"Acme\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        }))
        .unwrap();

        let response = from_wire_response(parsed).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls()[0].arguments["name"], "Acme");
        assert_eq!(response.usage.total(), 19);
    }

    #[test]
    fn test_from_wire_response_malformed_arguments() {
        let parsed: WireChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-2",
            "model": "m",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "bank_lookup", "arguments": "not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        assert!(matches!(
            from_wire_response(parsed),
            Err(LlmError::Serialization(_))
        ));
    }

    #[test]
    fn test_from_wire_response_no_choices() {
        let parsed: WireChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-3",
            "model": "m",
            "choices": []
        }))
        .unwrap();

        assert!(matches!(
            from_wire_response(parsed),
            Err(LlmError::Backend(_))
        ));
    }
}
