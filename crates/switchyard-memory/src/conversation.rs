//! Bounded conversation memory.
//!
//! Each conversation holds an ordered window of the most recent N turns.
//! Appending at capacity evicts exactly the oldest turn, atomically with
//! the append. Only the orchestrator mutates conversation state.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use switchyard_types::{ConversationId, ConversationTurn};

/// Default bound on the number of turns kept per conversation.
pub const DEFAULT_MAX_TURNS: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Conversation State
// ─────────────────────────────────────────────────────────────────────────────

/// The bounded turn window for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// The conversation this state belongs to.
    id: ConversationId,
    /// Ordered turns, oldest first.
    turns: VecDeque<ConversationTurn>,
    /// Maximum turns retained.
    max_turns: usize,
}

impl ConversationState {
    /// Create an empty state for the given conversation.
    pub fn new(id: ConversationId, max_turns: usize) -> Self {
        Self {
            id,
            turns: VecDeque::with_capacity(max_turns.min(64)),
            max_turns,
        }
    }

    /// The conversation id.
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Append a turn, evicting the oldest if at capacity.
    pub fn append(&mut self, turn: ConversationTurn) {
        if self.max_turns > 0 && self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// The `n` most recent turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> Vec<ConversationTurn> {
        let start = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(start).cloned().collect()
    }

    /// All retained turns, oldest first.
    pub fn all_turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation Memory
// ─────────────────────────────────────────────────────────────────────────────

/// In-process store of conversation states keyed by conversation id.
///
/// Reads are concurrent; writes take the lock briefly per append. A state
/// is created lazily on first append and removed only by [`reset`].
///
/// [`reset`]: ConversationMemory::reset
#[derive(Debug)]
pub struct ConversationMemory {
    states: RwLock<HashMap<ConversationId, ConversationState>>,
    max_turns: usize,
}

impl ConversationMemory {
    /// Create a memory store with the given per-conversation turn bound.
    pub fn new(max_turns: usize) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    /// Append a single turn to a conversation, creating it if needed.
    pub fn append(&self, conversation_id: ConversationId, turn: ConversationTurn) {
        let mut states = self.states.write();
        states
            .entry(conversation_id)
            .or_insert_with(|| ConversationState::new(conversation_id, self.max_turns))
            .append(turn);
    }

    /// Append a completed exchange (user turn + assistant turn) atomically.
    ///
    /// A cancelled turn never calls this, so memory holds either the whole
    /// exchange or nothing.
    pub fn append_exchange(
        &self,
        conversation_id: ConversationId,
        user_turn: ConversationTurn,
        assistant_turn: ConversationTurn,
    ) {
        let mut states = self.states.write();
        let state = states
            .entry(conversation_id)
            .or_insert_with(|| ConversationState::new(conversation_id, self.max_turns));
        state.append(user_turn);
        state.append(assistant_turn);

        tracing::debug!(
            %conversation_id,
            turns = state.len(),
            "Exchange recorded"
        );
    }

    /// The `n` most recent turns of a conversation, oldest first.
    ///
    /// Returns an empty list for unknown conversations.
    pub fn recent_turns(&self, conversation_id: ConversationId, n: usize) -> Vec<ConversationTurn> {
        self.states
            .read()
            .get(&conversation_id)
            .map(|s| s.recent_turns(n))
            .unwrap_or_default()
    }

    /// Whether a conversation exists.
    pub fn contains(&self, conversation_id: ConversationId) -> bool {
        self.states.read().contains_key(&conversation_id)
    }

    /// Number of turns retained for a conversation.
    pub fn turn_count(&self, conversation_id: ConversationId) -> usize {
        self.states
            .read()
            .get(&conversation_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Remove a conversation entirely. Returns true if it existed.
    pub fn reset(&self, conversation_id: ConversationId) -> bool {
        let removed = self.states.write().remove(&conversation_id).is_some();
        if removed {
            tracing::info!(%conversation_id, "Conversation reset");
        }
        removed
    }

    /// Number of tracked conversations.
    pub fn conversation_count(&self) -> usize {
        self.states.read().len()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(content: &str) -> ConversationTurn {
        ConversationTurn::user(content)
    }

    #[test]
    fn test_append_and_recent() {
        let memory = ConversationMemory::new(10);
        let id = ConversationId::new();

        memory.append(id, turn("one"));
        memory.append(id, turn("two"));
        memory.append(id, turn("three"));

        let recent = memory.recent_turns(id, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "two");
        assert_eq!(recent[1].content, "three");
    }

    #[test]
    fn test_window_bound_evicts_oldest() {
        let memory = ConversationMemory::new(3);
        let id = ConversationId::new();

        for i in 0..5 {
            memory.append(id, turn(&format!("turn-{i}")));
        }

        assert_eq!(memory.turn_count(id), 3);
        let turns = memory.recent_turns(id, 10);
        assert_eq!(turns[0].content, "turn-2");
        assert_eq!(turns[2].content, "turn-4");
    }

    #[test]
    fn test_append_at_capacity_evicts_exactly_one() {
        let memory = ConversationMemory::new(2);
        let id = ConversationId::new();

        memory.append(id, turn("a"));
        memory.append(id, turn("b"));
        memory.append(id, turn("c"));

        let turns = memory.recent_turns(id, 10);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "b");
        assert_eq!(turns[1].content, "c");
    }

    #[test]
    fn test_append_exchange_is_atomic_pair() {
        let memory = ConversationMemory::new(10);
        let id = ConversationId::new();

        memory.append_exchange(
            id,
            ConversationTurn::user("question"),
            ConversationTurn::assistant("answer", vec![]),
        );

        let turns = memory.recent_turns(id, 10);
        assert_eq!(turns.len(), 2);
        assert!(turns[0].is_user());
        assert!(!turns[1].is_user());
    }

    #[test]
    fn test_reset_removes_conversation() {
        let memory = ConversationMemory::new(10);
        let id = ConversationId::new();

        memory.append(id, turn("hello"));
        assert!(memory.contains(id));

        assert!(memory.reset(id));
        assert!(!memory.contains(id));
        assert!(memory.recent_turns(id, 5).is_empty());

        // Resetting again is a no-op.
        assert!(!memory.reset(id));
    }

    #[test]
    fn test_conversations_are_isolated() {
        let memory = ConversationMemory::new(10);
        let a = ConversationId::new();
        let b = ConversationId::new();

        memory.append(a, turn("for a"));
        memory.append(b, turn("for b"));

        assert_eq!(memory.conversation_count(), 2);
        assert_eq!(memory.recent_turns(a, 5)[0].content, "for a");
        assert_eq!(memory.recent_turns(b, 5)[0].content, "for b");
    }
}
