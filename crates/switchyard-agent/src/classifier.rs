//! Query classification: decide a routing strategy for one turn.
//!
//! A fast heuristic pass handles the clear cases (document lexicon vs
//! capability keyword match). Ambiguous turns go to a single bounded LLM
//! classification call; any failure there falls back to Hybrid, the safe
//! superset. Classification never errors.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use switchyard_llm::{CompletionRequest, SharedBackend};
use switchyard_types::ConversationTurn;

use crate::capability::{CapabilityCategory, CapabilityDescriptor};
use crate::catalog::CapabilityCatalog;

/// Default bound on the LLM classification call.
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Confidence for a heuristic decision with two or more keyword hits.
const STRONG_MATCH_CONFIDENCE: f32 = 0.9;

/// Confidence for a heuristic decision with a single keyword hit.
const WEAK_MATCH_CONFIDENCE: f32 = 0.65;

/// Confidence when falling back to Hybrid without a usable signal.
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Phrases indicating the user is asking about uploaded material.
const DOCUMENT_INTENT_LEXICON: &[&str] = &[
    "document",
    "documents",
    "uploaded",
    "upload",
    "file",
    "files",
    "attachment",
    "pdf",
    "report",
    "policy",
    "contract",
    "agreement",
    "say about",
    "says about",
    "according to the",
    "in the text",
    "summarize the",
];

// ─────────────────────────────────────────────────────────────────────────────
// Routing Decision
// ─────────────────────────────────────────────────────────────────────────────

/// The routing strategy chosen for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Answer from the document corpus only.
    DocumentsOnly,
    /// Answer from external tools only.
    ToolsOnly,
    /// Answer from both.
    Hybrid,
    /// Answer directly from the completion backend, no retrieval or tools.
    None,
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DocumentsOnly => "documents_only",
            Self::ToolsOnly => "tools_only",
            Self::Hybrid => "hybrid",
            Self::None => "none",
        };
        write!(f, "{s}")
    }
}

/// The classifier's output for one turn.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// The chosen strategy.
    pub strategy: RoutingStrategy,
    /// Candidate capabilities for the executor, priority descending.
    pub candidates: Vec<CapabilityDescriptor>,
    /// Classifier confidence in [0, 1].
    pub confidence: f32,
}

impl RoutingDecision {
    fn new(strategy: RoutingStrategy, candidates: Vec<CapabilityDescriptor>, confidence: f32) -> Self {
        Self {
            strategy,
            candidates,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The no-route decision for an empty catalog or a pure-chat turn.
    pub fn none(confidence: f32) -> Self {
        Self::new(RoutingStrategy::None, Vec::new(), confidence)
    }
}

/// Shape the LLM classification call must return.
#[derive(Debug, Deserialize)]
struct ClassificationReply {
    strategy: RoutingStrategy,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    #[allow(dead_code)]
    rationale: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Classifier
// ─────────────────────────────────────────────────────────────────────────────

/// Decides the routing strategy for one turn.
pub struct QueryClassifier {
    backend: SharedBackend,
    model: String,
    timeout: Duration,
}

impl QueryClassifier {
    /// Create a classifier using the given backend and model.
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    /// Set the LLM classification timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify one turn.
    ///
    /// Deterministic given a deterministic backend: identical inputs
    /// produce identical decisions.
    pub async fn classify(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
        catalog: &CapabilityCatalog,
    ) -> RoutingDecision {
        // Nothing to route to, regardless of signals.
        if catalog.is_empty() {
            tracing::info!(strategy = "none", "Routing: empty catalog");
            return RoutingDecision::none(1.0);
        }

        let doc_hits = document_signal(user_message, catalog);
        let tool_hits = tool_signal(user_message, catalog);

        let decision = match (doc_hits, tool_hits) {
            (d, 0) if d > 0 => RoutingDecision::new(
                RoutingStrategy::DocumentsOnly,
                candidates_for(RoutingStrategy::DocumentsOnly, catalog),
                match_confidence(d),
            ),
            (0, t) if t > 0 => RoutingDecision::new(
                RoutingStrategy::ToolsOnly,
                candidates_for(RoutingStrategy::ToolsOnly, catalog),
                match_confidence(t),
            ),
            (d, t) if d > 0 && t > 0 => {
                // Both signal classes fired; Hybrid is the resolution, no
                // LLM call needed.
                RoutingDecision::new(
                    RoutingStrategy::Hybrid,
                    candidates_for(RoutingStrategy::Hybrid, catalog),
                    FALLBACK_CONFIDENCE,
                )
            }
            _ => self.classify_with_llm(user_message, history, catalog).await,
        };

        tracing::info!(
            strategy = %decision.strategy,
            confidence = decision.confidence,
            candidates = decision.candidates.len(),
            "Routing decided"
        );
        decision
    }

    /// The LLM-assisted pass for ambiguous turns.
    ///
    /// One bounded call; timeout or malformed output falls back to Hybrid
    /// rather than failing the turn.
    async fn classify_with_llm(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
        catalog: &CapabilityCatalog,
    ) -> RoutingDecision {
        let request = CompletionRequest::new(
            &self.model,
            vec![switchyard_llm::Message::user(classification_prompt(
                user_message,
                history,
                catalog,
            ))],
            512,
        )
        .with_system(
            "You route user questions for a tool-augmented assistant. \
             Reply with a single JSON object: {\"strategy\": \
             \"documents_only\"|\"tools_only\"|\"hybrid\"|\"none\", \
             \"confidence\": <0..1>, \"rationale\": \"<one sentence>\"}. \
             No other text.",
        )
        .with_temperature(0.0);

        let reply = match tokio::time::timeout(self.timeout, self.backend.complete(request)).await {
            Ok(Ok(response)) => parse_classification(&response.text()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Classification call failed, falling back to hybrid");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Classification call timed out, falling back to hybrid"
                );
                None
            }
        };

        match reply {
            Some(reply) => {
                let strategy = reply.strategy;
                let confidence = reply.confidence.unwrap_or(FALLBACK_CONFIDENCE);
                RoutingDecision::new(strategy, candidates_for(strategy, catalog), confidence)
            }
            None => RoutingDecision::new(
                RoutingStrategy::Hybrid,
                candidates_for(RoutingStrategy::Hybrid, catalog),
                FALLBACK_CONFIDENCE,
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Heuristic Signals
// ─────────────────────────────────────────────────────────────────────────────

/// Count document-intent lexicon hits. Zero when the catalog has no
/// document capability to route to.
fn document_signal(user_message: &str, catalog: &CapabilityCatalog) -> usize {
    if !catalog.has_category(CapabilityCategory::Documents) {
        return 0;
    }
    let message = user_message.to_lowercase();
    DOCUMENT_INTENT_LEXICON
        .iter()
        .filter(|phrase| message.contains(*phrase))
        .count()
}

/// Count keyword overlaps between the message and available non-document
/// capability names/descriptions.
fn tool_signal(user_message: &str, catalog: &CapabilityCatalog) -> usize {
    let message_words: HashSet<String> = words_of(&user_message.to_lowercase());

    catalog
        .all()
        .iter()
        .filter(|d| d.category != CapabilityCategory::Documents)
        .map(|d| {
            let capability_words: HashSet<String> =
                words_of(&format!("{} {}", d.name, d.description).to_lowercase());
            capability_words.intersection(&message_words).count()
        })
        .sum()
}

/// Split into alphanumeric words of 3+ chars, dropping routing-useless
/// stopwords.
fn words_of(text: &str) -> HashSet<String> {
    const STOPWORDS: &[&str] = &["the", "and", "for", "with", "from", "that", "this", "what"];
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn match_confidence(hits: usize) -> f32 {
    if hits >= 2 {
        STRONG_MATCH_CONFIDENCE
    } else {
        WEAK_MATCH_CONFIDENCE
    }
}

/// Candidate capabilities for a strategy, in catalog (priority) order.
fn candidates_for(strategy: RoutingStrategy, catalog: &CapabilityCatalog) -> Vec<CapabilityDescriptor> {
    let keep = |d: &&&CapabilityDescriptor| match strategy {
        RoutingStrategy::DocumentsOnly => d.category == CapabilityCategory::Documents,
        RoutingStrategy::ToolsOnly => d.category != CapabilityCategory::Documents,
        RoutingStrategy::Hybrid => true,
        RoutingStrategy::None => false,
    };
    catalog.all().iter().filter(keep).map(|d| (*d).clone()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt & Parsing
// ─────────────────────────────────────────────────────────────────────────────

fn classification_prompt(
    user_message: &str,
    history: &[ConversationTurn],
    catalog: &CapabilityCatalog,
) -> String {
    let mut prompt = String::from("Available capabilities:\n");
    for descriptor in catalog.all() {
        prompt.push_str(&format!(
            "- {} [{}]: {}\n",
            descriptor.name, descriptor.category, descriptor.description
        ));
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history.iter().rev().take(6).rev() {
            let role = if turn.is_user() { "user" } else { "assistant" };
            let content: String = turn.content.chars().take(200).collect();
            prompt.push_str(&format!("{role}: {content}\n"));
        }
    }

    prompt.push_str(&format!("\nUser question: {user_message}\n"));
    prompt.push_str("\nWhich routing strategy should be used?");
    prompt
}

/// Parse the classification reply, tolerating surrounding prose.
fn parse_classification(text: &str) -> Option<ClassificationReply> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
