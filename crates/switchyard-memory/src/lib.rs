//! Conversation memory and retrieval boundary for Switchyard.
//!
//! [`ConversationMemory`] keeps a bounded, ordered window of turns per
//! conversation id, evicting oldest-first. Conversation state lives in
//! process memory only; persistence belongs to the embedding application.
//!
//! [`DocumentRetriever`] is the seam to the vector/document search engine.
//! The core never sees index internals, only scored chunks.

pub mod conversation;
pub mod error;
pub mod retrieval;

pub use conversation::{ConversationMemory, ConversationState};
pub use error::{MemoryError, Result};
pub use retrieval::{DocumentRetriever, MockRetriever, RetrievedChunk, SharedRetriever};
