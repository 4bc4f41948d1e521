//! Response synthesis: merge retrieved chunks and tool outputs into one
//! attributed answer with a confidence estimate.
//!
//! The grounding contract is hard: for DocumentsOnly and ToolsOnly turns
//! with no grounding content, the answer is the explicit no-information
//! text with zero attributions. That is enforced twice, once by
//! short-circuiting before the backend call and again by a post-hoc check
//! on whatever text the backend produced.

use switchyard_llm::{CompletionRequest, SharedBackend, Usage};
use switchyard_memory::RetrievedChunk;
use switchyard_types::SourceAttribution;

use crate::classifier::{RoutingDecision, RoutingStrategy};
use crate::error::Result;
use crate::executor::{InvocationOutcome, LoopResult, ToolInvocationRecord};
use crate::types::AgentConfig;

/// The explicit answer used when grounding is required but empty.
pub const NO_INFORMATION_ANSWER: &str =
    "No information is available to answer this question from the configured sources.";

/// Substring whose presence marks a no-information answer.
pub const NO_INFORMATION_MARKER: &str = "No information is available";

/// Confidence assigned to a no-information answer.
const EMPTY_GROUNDING_CONFIDENCE: f32 = 0.2;

/// Confidence penalty applied when the step cap forced synthesis.
const PARTIAL_PENALTY: f32 = 0.3;

/// Longest excerpt carried into an attribution.
const EXCERPT_LIMIT: usize = 200;

const GROUNDED_SYSTEM_PROMPT: &str = "Answer the user's question strictly from \
the grounding context below. Do not introduce outside knowledge. If the \
context does not contain the answer, reply exactly: \"No information is \
available to answer this question from the configured sources.\" Cite the \
bracketed source labels you relied on.";

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

/// One turn's synthesized output.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// The answer text.
    pub answer: String,
    /// Citations backing the answer.
    pub attributions: Vec<SourceAttribution>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Usage of the synthesis completion call, if one was made.
    pub usage: Usage,
}

/// Composes the final answer from what the loop gathered.
pub struct ResponseSynthesizer {
    backend: SharedBackend,
    config: AgentConfig,
}

impl ResponseSynthesizer {
    /// Create a synthesizer over the given backend.
    pub fn new(backend: SharedBackend, config: AgentConfig) -> Self {
        Self { backend, config }
    }

    /// Synthesize the turn's answer.
    ///
    /// When the planner already produced a final text, that text is the
    /// answer and no completion call is made; otherwise one grounded call
    /// composes it. Either way the no-information contract is enforced
    /// post hoc.
    pub async fn synthesize(
        &self,
        user_message: &str,
        decision: &RoutingDecision,
        result: &LoopResult,
    ) -> Result<Synthesis> {
        // Direct answers carry no grounding and no attributions.
        if decision.strategy == RoutingStrategy::None {
            return Ok(Synthesis {
                answer: result.final_text.clone().unwrap_or_default(),
                attributions: Vec::new(),
                confidence: decision.confidence,
                usage: Usage::default(),
            });
        }

        let grounding = grounding_context(&result.chunks, &result.records);

        if grounding.is_empty() && requires_grounding(decision.strategy) {
            tracing::info!(strategy = %decision.strategy, "Empty grounding, answering no-information");
            return Ok(Synthesis {
                answer: NO_INFORMATION_ANSWER.to_string(),
                attributions: Vec::new(),
                confidence: EMPTY_GROUNDING_CONFIDENCE,
                usage: Usage::default(),
            });
        }

        let attributions = build_attributions(&result.chunks, &result.records);

        let (answer, usage) = match &result.final_text {
            Some(text) => (text.clone(), Usage::default()),
            None => self.compose(user_message, &grounding, result.partial).await?,
        };

        let confidence = confidence_estimate(
            !grounding.is_empty(),
            decision.confidence,
            result.partial,
        );

        Ok(enforce_grounding_contract(
            decision.strategy,
            &grounding,
            Synthesis {
                answer,
                attributions,
                confidence,
                usage,
            },
        ))
    }

    /// One grounded completion call composing the answer text.
    async fn compose(
        &self,
        user_message: &str,
        grounding: &str,
        partial: bool,
    ) -> Result<(String, Usage)> {
        let mut prompt = String::new();
        if !grounding.is_empty() {
            prompt.push_str("Grounding context:\n");
            prompt.push_str(grounding);
            prompt.push('\n');
        }
        if partial {
            prompt.push_str(
                "Note: information gathering was cut short; answer from what is \
                 above and say the answer may be incomplete.\n",
            );
        }
        prompt.push_str(&format!("\nQuestion: {user_message}"));

        let request = CompletionRequest::new(
            &self.config.model,
            vec![switchyard_llm::Message::user(prompt)],
            self.config.max_tokens,
        )
        .with_system(GROUNDED_SYSTEM_PROMPT);

        let response = switchyard_llm::with_retry(
            self.config.backend_retries,
            self.config.backend_backoff,
            self.backend.name(),
            || self.backend.complete(request.clone()),
        )
        .await?;
        Ok((response.text(), response.usage))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grounding & Attribution
// ─────────────────────────────────────────────────────────────────────────────

fn requires_grounding(strategy: RoutingStrategy) -> bool {
    matches!(
        strategy,
        RoutingStrategy::DocumentsOnly | RoutingStrategy::ToolsOnly
    )
}

/// Render the grounding context from successful outputs only. Failed and
/// timed-out invocations are summarized as unavailable, never included as
/// content.
fn grounding_context(chunks: &[RetrievedChunk], records: &[ToolInvocationRecord]) -> String {
    let mut sections = Vec::new();

    for chunk in chunks {
        sections.push(format!("[doc:{}] {}", chunk.source_id, chunk.content));
    }

    let mut unavailable = Vec::new();
    for record in records {
        match &record.outcome {
            InvocationOutcome::Success { payload } => {
                let rendered =
                    serde_json::to_string(payload).unwrap_or_else(|_| payload.to_string());
                sections.push(format!("[tool:{}] {}", record.capability, rendered));
            }
            InvocationOutcome::Failed { .. } | InvocationOutcome::TimedOut => {
                unavailable.push(record.capability.as_str());
            }
        }
    }

    if sections.is_empty() {
        return String::new();
    }

    if !unavailable.is_empty() {
        sections.push(format!("(unavailable sources: {})", unavailable.join(", ")));
    }
    sections.join("\n")
}

/// Attributions from chunks and successful invocations, in gathering order.
fn build_attributions(
    chunks: &[RetrievedChunk],
    records: &[ToolInvocationRecord],
) -> Vec<SourceAttribution> {
    let mut attributions = Vec::new();

    for chunk in chunks {
        attributions.push(SourceAttribution::document(
            &chunk.source_id,
            excerpt(&chunk.content),
        ));
    }

    for record in records {
        if let InvocationOutcome::Success { payload } = &record.outcome {
            let rendered = serde_json::to_string(payload).unwrap_or_else(|_| payload.to_string());
            attributions.push(SourceAttribution::tool(&record.capability, excerpt(&rendered)));
        }
    }

    attributions
}

fn excerpt(content: &str) -> String {
    if content.chars().count() <= EXCERPT_LIMIT {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(EXCERPT_LIMIT).collect();
        format!("{truncated}…")
    }
}

/// Heuristic confidence from grounding presence, classifier confidence,
/// and the partial-answer penalty.
fn confidence_estimate(grounded: bool, classifier_confidence: f32, partial: bool) -> f32 {
    let mut confidence = if grounded {
        0.4 + 0.5 * classifier_confidence
    } else {
        EMPTY_GROUNDING_CONFIDENCE
    };
    if partial {
        confidence -= PARTIAL_PENALTY;
    }
    confidence.clamp(0.05, 0.95)
}

/// Post-hoc enforcement of the no-information contract.
///
/// If the strategy required grounding and none existed, the answer is the
/// no-information text with zero attributions, whatever the backend said.
fn enforce_grounding_contract(
    strategy: RoutingStrategy,
    grounding: &str,
    synthesis: Synthesis,
) -> Synthesis {
    if requires_grounding(strategy) && grounding.is_empty() {
        tracing::warn!("Backend produced content without grounding, replacing with no-information");
        return Synthesis {
            answer: NO_INFORMATION_ANSWER.to_string(),
            attributions: Vec::new(),
            confidence: EMPTY_GROUNDING_CONFIDENCE,
            usage: synthesis.usage,
        };
    }
    synthesis
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
