//! Error types for the agent crate.
//!
//! Tool-level failures are data, not errors: a failed or timed-out
//! invocation becomes an [`InvocationOutcome`] on the turn's record list
//! and feeds back into planning, and retrieval failures degrade to an
//! empty chunk list. The only fatal turn error is a completion backend
//! that stays unreachable through its retries.
//!
//! [`InvocationOutcome`]: crate::executor::InvocationOutcome

use thiserror::Error;

use switchyard_llm::LlmError;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Completion backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The turn was cancelled cooperatively.
    #[error("Turn cancelled")]
    Cancelled,

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the caller may retry the whole turn.
    ///
    /// True only for the unreachable-backend case; everything else is
    /// either recovered internally or a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Llm(e) if e.is_unreachable())
    }
}
