//! Document-retrieval boundary.
//!
//! The core only depends on this trait; the actual vector index, chunking,
//! and embedding pipeline live outside the crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Retrieved Chunk
// ─────────────────────────────────────────────────────────────────────────────

/// A scored chunk returned from the document index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text content.
    pub content: String,
    /// Stable identifier of the source document/chunk.
    pub source_id: String,
    /// Similarity score (higher is closer).
    pub score: f32,
}

impl RetrievedChunk {
    /// Create a new chunk.
    pub fn new(content: impl Into<String>, source_id: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
            score,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retriever Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for the vector/document search collaborator.
///
/// Implementations must be deterministic for identical inputs against an
/// unchanged index: same query, same ordered results.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Search the corpus, returning at most `k` chunks at or above
    /// `score_threshold`, ordered by descending score.
    async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// A retriever that can be shared across tasks.
pub type SharedRetriever = Arc<dyn DocumentRetriever>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Retriever
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic retriever for testing.
///
/// Returns a fixed chunk list, applying threshold and `k` like a real
/// index would, and records the queries it receives.
#[derive(Debug, Default)]
pub struct MockRetriever {
    chunks: Vec<RetrievedChunk>,
    queries: std::sync::Mutex<Vec<String>>,
}

impl MockRetriever {
    /// Create a retriever that returns no chunks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a retriever with a fixed result set (descending score order
    /// is the caller's responsibility, as with a real index).
    pub fn with_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            queries: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentRetriever for MockRetriever {
    async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        self.queries.lock().unwrap().push(query.to_string());

        Ok(self
            .chunks
            .iter()
            .filter(|c| c.score >= score_threshold)
            .take(k)
            .cloned()
            .collect())
    }
}
