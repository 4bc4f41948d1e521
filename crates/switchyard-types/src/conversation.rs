//! Conversation data model.
//!
//! Defines the identifiers and the immutable turn/attribution records that
//! flow between the memory store, the execution loop, and the synthesizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// ID Types
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Create a new random conversation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a turn within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Create a new random turn ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Attribution
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of source an attribution points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionKind {
    /// A chunk retrieved from the document corpus.
    Document,
    /// Output of an external data tool.
    Tool,
}

/// A citation attached to an assistant answer.
///
/// Each attribution names the source a claim was grounded on: either a
/// document chunk id or a capability name, plus the excerpt that was used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    /// Whether this came from the document corpus or a tool.
    pub kind: AttributionKind,
    /// Document/chunk id, or capability name.
    pub identifier: String,
    /// Excerpt or summary of the cited content.
    pub excerpt: String,
}

impl SourceAttribution {
    /// Create a document attribution.
    pub fn document(identifier: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            kind: AttributionKind::Document,
            identifier: identifier.into(),
            excerpt: excerpt.into(),
        }
    }

    /// Create a tool attribution.
    pub fn tool(identifier: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            kind: AttributionKind::Tool,
            identifier: identifier.into(),
            excerpt: excerpt.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation Turn
// ─────────────────────────────────────────────────────────────────────────────

/// The author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single recorded turn in a conversation.
///
/// Turns are immutable once appended to conversation memory. User turns
/// never carry attributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique identifier for this turn.
    pub id: TurnId,
    /// Who authored the turn.
    pub role: TurnRole,
    /// The turn content.
    pub content: String,
    /// Source citations (empty for user turns).
    pub attributions: Vec<SourceAttribution>,
    /// When the turn was recorded.
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::User,
            content: content.into(),
            attributions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create an assistant turn with attributions.
    pub fn assistant(content: impl Into<String>, attributions: Vec<SourceAttribution>) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::Assistant,
            content: content.into(),
            attributions,
            created_at: Utc::now(),
        }
    }

    /// Check whether this turn was authored by the user.
    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_display_roundtrip() {
        let id = ConversationId::new();
        let uuid: Uuid = id.to_string().parse().unwrap();
        assert_eq!(ConversationId::from_uuid(uuid), id);
    }

    #[test]
    fn test_user_turn_has_no_attributions() {
        let turn = ConversationTurn::user("hello");
        assert!(turn.is_user());
        assert!(turn.attributions.is_empty());
    }

    #[test]
    fn test_assistant_turn_carries_attributions() {
        let turn = ConversationTurn::assistant(
            "The policy requires X.",
            vec![SourceAttribution::document("doc-1#chunk-3", "requires X")],
        );
        assert!(!turn.is_user());
        assert_eq!(turn.attributions.len(), 1);
        assert_eq!(turn.attributions[0].kind, AttributionKind::Document);
    }

    #[test]
    fn test_attribution_serialization() {
        let attr = SourceAttribution::tool("bank_lookup", "RSSD 12345");
        let json = serde_json::to_string(&attr).unwrap();
        assert!(json.contains("\"tool\""));
        let restored: SourceAttribution = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, attr);
    }
}
