//! The PLAN → ACT → OBSERVE execution loop.
//!
//! An explicit state machine with a step counter and a configured cap.
//! PLAN asks the backend for a final answer or exactly one invocation;
//! ACT runs that single invocation under a timeout (never concurrently
//! within a turn); OBSERVE records the outcome and feeds it back. Tool
//! failures and timeouts are data on the record list. The only fatal
//! condition is a backend that stays unreachable through its retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use switchyard_llm::{
    with_retry, CompletionRequest, ContentBlock, Message, SharedBackend, ToolDefinition, Usage,
};
use switchyard_memory::{RetrievedChunk, SharedRetriever};
use switchyard_types::{ConversationId, ConversationTurn, TurnId};

use crate::capability::InvocationContext;
use crate::catalog::CapabilityCatalog;
use crate::classifier::{RoutingDecision, RoutingStrategy};
use crate::error::{AgentError, Result};
use crate::types::AgentConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Invocation Records
// ─────────────────────────────────────────────────────────────────────────────

/// How one capability invocation ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// The capability returned a payload.
    Success {
        /// The returned payload.
        payload: serde_json::Value,
    },
    /// The capability reported a typed failure.
    Failed {
        /// The failure message, phrased for the planner.
        error: String,
    },
    /// The invocation exceeded its timeout.
    TimedOut,
}

impl InvocationOutcome {
    /// Whether this outcome carries a usable payload.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Audit record for one invocation within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    /// Capability that was invoked.
    pub capability: String,
    /// The resolved arguments.
    pub arguments: serde_json::Value,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation finished (or timed out).
    pub finished_at: DateTime<Utc>,
    /// How it ended.
    pub outcome: InvocationOutcome,
}

impl ToolInvocationRecord {
    /// Wall-clock duration of the invocation.
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// The outcome rendered for the planner's tool-result message.
    pub fn planner_content(&self) -> (String, bool) {
        match &self.outcome {
            InvocationOutcome::Success { payload } => (
                serde_json::to_string(payload).unwrap_or_else(|_| payload.to_string()),
                false,
            ),
            InvocationOutcome::Failed { error } => (format!("invocation failed: {error}"), true),
            InvocationOutcome::TimedOut => ("invocation timed out".to_string(), true),
        }
    }
}

/// What one loop run produced, handed to the synthesizer.
#[derive(Debug, Clone, Default)]
pub struct LoopResult {
    /// Final answer text, when the planner produced one. `None` means the
    /// synthesizer must compose the answer (documents-only retrieval, or a
    /// forced stop).
    pub final_text: Option<String>,
    /// Invocation records in strict execution order.
    pub records: Vec<ToolInvocationRecord>,
    /// Chunks retrieved for grounding.
    pub chunks: Vec<RetrievedChunk>,
    /// Whether the step cap forced termination.
    pub partial: bool,
    /// Accumulated token usage across loop completions.
    pub usage: Usage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution Loop
// ─────────────────────────────────────────────────────────────────────────────

const PLANNER_SYSTEM_PROMPT: &str = "You are a planning assistant. Either answer \
the user's question directly, or call exactly one of the provided tools to \
gather the information you still need. Call one tool at a time. When you have \
enough information, answer directly and cite which tool results you used.";

/// Drives one turn's retrieval and tool invocations per the routing
/// decision.
pub struct AgentExecutionLoop {
    backend: SharedBackend,
    retriever: SharedRetriever,
    config: AgentConfig,
}

impl AgentExecutionLoop {
    /// Create a loop over the given collaborators.
    pub fn new(backend: SharedBackend, retriever: SharedRetriever, config: AgentConfig) -> Self {
        Self {
            backend,
            retriever,
            config,
        }
    }

    /// Run one turn.
    ///
    /// Cancellation is checked between states; a cancelled turn returns
    /// [`AgentError::Cancelled`] and produces no memory side effects here.
    pub async fn run(
        &self,
        conversation_id: ConversationId,
        decision: &RoutingDecision,
        catalog: &CapabilityCatalog,
        history: &[ConversationTurn],
        user_message: &str,
        cancellation: &CancellationToken,
    ) -> Result<LoopResult> {
        match decision.strategy {
            RoutingStrategy::None => self.run_direct(history, user_message).await,
            RoutingStrategy::DocumentsOnly => self.run_retrieval_only(user_message).await,
            RoutingStrategy::ToolsOnly | RoutingStrategy::Hybrid => {
                self.run_tool_loop(
                    conversation_id,
                    decision,
                    catalog,
                    history,
                    user_message,
                    cancellation,
                )
                .await
            }
        }
    }

    /// Strategy None: one direct completion, no records, no grounding.
    async fn run_direct(
        &self,
        history: &[ConversationTurn],
        user_message: &str,
    ) -> Result<LoopResult> {
        let mut messages = history_messages(history);
        messages.push(Message::user(user_message));

        let request =
            CompletionRequest::new(&self.config.model, messages, self.config.max_tokens);
        let response = self.complete_with_retry(request).await?;

        Ok(LoopResult {
            final_text: Some(response.text()),
            usage: response.usage,
            ..Default::default()
        })
    }

    /// DocumentsOnly: a single retrieval Act/Observe pass, no planning.
    async fn run_retrieval_only(&self, user_message: &str) -> Result<LoopResult> {
        Ok(LoopResult {
            chunks: self.retrieve(user_message).await,
            ..Default::default()
        })
    }

    /// ToolsOnly/Hybrid: the full plan/act/observe loop.
    async fn run_tool_loop(
        &self,
        conversation_id: ConversationId,
        decision: &RoutingDecision,
        catalog: &CapabilityCatalog,
        history: &[ConversationTurn],
        user_message: &str,
        cancellation: &CancellationToken,
    ) -> Result<LoopResult> {
        let mut result = LoopResult::default();

        // Hybrid grounds on documents too; retrieval happens once, before
        // the first plan.
        if decision.strategy == RoutingStrategy::Hybrid {
            result.chunks = self.retrieve(user_message).await;
        }

        let tools: Vec<ToolDefinition> = decision
            .candidates
            .iter()
            .map(|d| ToolDefinition::new(&d.name, &d.description, d.input_schema()))
            .collect();

        let mut transcript = history_messages(history);
        transcript.push(Message::user(user_message));

        let turn_id = TurnId::new();
        let mut steps = 0usize;

        loop {
            if cancellation.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            if steps >= self.config.max_steps {
                tracing::warn!(
                    steps,
                    max_steps = self.config.max_steps,
                    "Step cap reached, forcing synthesis"
                );
                result.partial = true;
                return Ok(result);
            }

            // PLAN
            let request = CompletionRequest::new(
                &self.config.model,
                transcript.clone(),
                self.config.max_tokens,
            )
            .with_system(PLANNER_SYSTEM_PROMPT)
            .with_tools(tools.clone());

            let response = self.complete_with_retry(request).await?;
            result.usage.input_tokens += response.usage.input_tokens;
            result.usage.output_tokens += response.usage.output_tokens;

            if !response.has_tool_use() {
                result.final_text = Some(response.text());
                return Ok(result);
            }

            // Exactly one invocation per Act; extra requests are dropped.
            let calls = response.tool_calls();
            if calls.len() > 1 {
                tracing::warn!(
                    requested = calls.len(),
                    "Planner requested multiple invocations, executing the first"
                );
            }
            let call = calls
                .into_iter()
                .next()
                .ok_or_else(|| AgentError::internal("tool-use response without a tool call"))?;

            transcript.push(Message::assistant_blocks(vec![ContentBlock::tool_use(
                &call.id,
                &call.name,
                call.arguments.clone(),
            )]));

            if cancellation.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // ACT
            let record = self
                .act(conversation_id, turn_id, catalog, &call.name, call.arguments, cancellation)
                .await;

            tracing::debug!(
                step = steps + 1,
                capability = %record.capability,
                success = record.outcome.is_success(),
                duration_ms = record.duration().as_millis() as u64,
                "Invocation observed"
            );

            // OBSERVE
            let (content, is_error) = record.planner_content();
            transcript.push(Message::tool_result(&call.id, content, is_error));
            result.records.push(record);
            steps += 1;
        }
    }

    /// Execute one invocation under the per-invocation timeout.
    ///
    /// Never errors; every path produces a record.
    async fn act(
        &self,
        conversation_id: ConversationId,
        turn_id: TurnId,
        catalog: &CapabilityCatalog,
        name: &str,
        arguments: serde_json::Value,
        cancellation: &CancellationToken,
    ) -> ToolInvocationRecord {
        let started_at = Utc::now();

        let outcome = match catalog.get(name) {
            None => InvocationOutcome::Failed {
                error: format!("unknown capability '{name}'"),
            },
            Some(capability) => {
                // Validate before invoking so collaborators only ever see
                // schema-conforming arguments.
                if let Err(message) = capability.descriptor().validate_arguments(&arguments) {
                    InvocationOutcome::Failed {
                        error: format!("invalid arguments: {message}"),
                    }
                } else {
                    let ctx = InvocationContext::with_cancellation(
                        conversation_id,
                        turn_id,
                        cancellation.clone(),
                    );
                    match tokio::time::timeout(
                        self.config.invocation_timeout,
                        capability.invoke(arguments.clone(), &ctx),
                    )
                    .await
                    {
                        Ok(Ok(payload)) => InvocationOutcome::Success { payload },
                        Ok(Err(failure)) => InvocationOutcome::Failed {
                            error: failure.message,
                        },
                        Err(_) => {
                            tracing::warn!(
                                capability = name,
                                timeout_ms = self.config.invocation_timeout.as_millis() as u64,
                                "Invocation timed out"
                            );
                            InvocationOutcome::TimedOut
                        }
                    }
                }
            }
        };

        ToolInvocationRecord {
            capability: name.to_string(),
            arguments,
            started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }

    /// Retrieval pass. Failures are recovered as an empty chunk list.
    async fn retrieve(&self, query: &str) -> Vec<RetrievedChunk> {
        match self
            .retriever
            .search(query, self.config.retrieval_k, self.config.retrieval_threshold)
            .await
        {
            Ok(chunks) => {
                tracing::debug!(chunks = chunks.len(), "Retrieval pass complete");
                chunks
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed, continuing without chunks");
                Vec::new()
            }
        }
    }

    /// Backend call with the shared transient-error retry policy.
    async fn complete_with_retry(
        &self,
        request: CompletionRequest,
    ) -> Result<switchyard_llm::CompletionResponse> {
        with_retry(
            self.config.backend_retries,
            self.config.backend_backoff,
            self.backend.name(),
            || self.backend.complete(request.clone()),
        )
        .await
        .map_err(AgentError::from)
    }
}

/// Render prior turns as backend messages.
fn history_messages(history: &[ConversationTurn]) -> Vec<Message> {
    history
        .iter()
        .map(|turn| {
            if turn.is_user() {
                Message::user(&turn.content)
            } else {
                Message::assistant(&turn.content)
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
