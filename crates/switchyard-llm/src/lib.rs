//! Completion-backend abstraction for Switchyard.
//!
//! The core abstraction is the [`CompletionBackend`] trait: one call in, one
//! response out, with tool definitions supplied per request and tool-use
//! blocks coming back in the response. The agent core is written against the
//! trait; providers are interchangeable.
//!
//! [`MockBackend`] provides scripted, deterministic responses for tests.

pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{with_retry, CompletionBackend, MockBackend, SharedBackend};
pub use error::{LlmError, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason,
    ToolCallRequest, ToolDefinition, Usage,
};
