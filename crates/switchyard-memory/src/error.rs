//! Error types for the memory crate.

use thiserror::Error;

/// Result type alias using the memory error type.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Error type for memory and retrieval operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The retrieval engine failed to answer a search.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Create a retrieval error.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::retrieval("index offline");
        assert!(err.to_string().contains("Retrieval error"));
        assert!(err.to_string().contains("index offline"));
    }
}
