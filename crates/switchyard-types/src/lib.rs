//! Shared types for the Switchyard agent core.
//!
//! This crate holds the identifiers and conversation data model that every
//! other Switchyard crate depends on. It deliberately has no async or I/O
//! dependencies so it can sit at the bottom of the dependency graph.

pub mod conversation;

pub use conversation::{
    AttributionKind, ConversationId, ConversationTurn, SourceAttribution, TurnId, TurnRole,
};
