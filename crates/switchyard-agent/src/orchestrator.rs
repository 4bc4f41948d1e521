//! The caller-facing conversation API.
//!
//! One turn flows memory → catalog → classifier → execution loop →
//! synthesizer → memory. The user and assistant turns are appended
//! together once the turn completes, so a cancelled or failed turn leaves
//! no partial conversation state.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use switchyard_config::SwitchyardConfig;
use switchyard_llm::{SharedBackend, Usage};
use switchyard_memory::{ConversationMemory, SharedRetriever};
use switchyard_types::{ConversationId, ConversationTurn};

use crate::capability::CapabilityRegistry;
use crate::catalog::CatalogBuilder;
use crate::classifier::QueryClassifier;
use crate::error::{AgentError, Result};
use crate::executor::AgentExecutionLoop;
use crate::probe::{ProbeCache, SharedProbe};
use crate::synthesizer::ResponseSynthesizer;
use crate::types::{AgentConfig, InvocationTiming, StrategyUsed, TurnOutcome};

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Wires the agent components into the conversation API.
pub struct Orchestrator {
    registry: CapabilityRegistry,
    probes: ProbeCache,
    memory: Arc<ConversationMemory>,
    classifier: QueryClassifier,
    executor: AgentExecutionLoop,
    synthesizer: ResponseSynthesizer,
    config: AgentConfig,
}

impl Orchestrator {
    /// Create an orchestrator with default configuration.
    pub fn new(
        backend: SharedBackend,
        retriever: SharedRetriever,
        registry: CapabilityRegistry,
        probes: ProbeCache,
    ) -> Self {
        Self::with_config(backend, retriever, registry, probes, AgentConfig::default())
    }

    /// Create an orchestrator with explicit configuration.
    pub fn with_config(
        backend: SharedBackend,
        retriever: SharedRetriever,
        registry: CapabilityRegistry,
        probes: ProbeCache,
        config: AgentConfig,
    ) -> Self {
        let classifier = QueryClassifier::new(backend.clone(), &config.model)
            .with_timeout(config.classify_timeout);
        let executor = AgentExecutionLoop::new(backend.clone(), retriever, config.clone());
        let synthesizer = ResponseSynthesizer::new(backend, config.clone());

        Self {
            registry,
            probes,
            memory: Arc::new(ConversationMemory::default()),
            classifier,
            executor,
            synthesizer,
            config,
        }
    }

    /// Create an orchestrator from the loaded file config.
    ///
    /// `[llm]` and `[agent]` feed [`AgentConfig`], `[probe]` sets the
    /// verdict cache's TTL and timeout, and `[memory]` bounds the
    /// conversation window.
    ///
    /// [`AgentConfig`]: crate::types::AgentConfig
    pub fn from_file_config(
        backend: SharedBackend,
        retriever: SharedRetriever,
        registry: CapabilityRegistry,
        probe: SharedProbe,
        file: &SwitchyardConfig,
    ) -> Self {
        let probes = ProbeCache::from_file_config(probe, &file.probe());
        let memory = Arc::new(ConversationMemory::new(file.memory().max_turns));
        Self::with_config(backend, retriever, registry, probes, file.into())
            .with_memory(memory)
    }

    /// Replace the conversation store, e.g. to share one across instances.
    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    /// The conversation store.
    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Process one user turn.
    pub async fn start_turn(
        &self,
        conversation_id: ConversationId,
        user_message: &str,
    ) -> Result<TurnOutcome> {
        self.start_turn_with_cancellation(conversation_id, user_message, CancellationToken::new())
            .await
    }

    /// Process one user turn under a caller-held cancellation token.
    ///
    /// Cancellation between states aborts the turn with
    /// [`AgentError::Cancelled`] and leaves conversation memory untouched.
    pub async fn start_turn_with_cancellation(
        &self,
        conversation_id: ConversationId,
        user_message: &str,
        cancellation: CancellationToken,
    ) -> Result<TurnOutcome> {
        tracing::info!(%conversation_id, "Turn started");

        let history = self
            .memory
            .recent_turns(conversation_id, self.config.history_window);

        // A fresh catalog snapshot per turn; the probe cache keeps this
        // cheap within its TTL window.
        let catalog = CatalogBuilder::build(&self.registry, &self.probes).await;

        let decision = self
            .classifier
            .classify(user_message, &history, &catalog)
            .await;

        if cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let result = self
            .executor
            .run(
                conversation_id,
                &decision,
                &catalog,
                &history,
                user_message,
                &cancellation,
            )
            .await?;

        let synthesis = self
            .synthesizer
            .synthesize(user_message, &decision, &result)
            .await?;

        if cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // Whole exchange or nothing.
        self.memory.append_exchange(
            conversation_id,
            ConversationTurn::user(user_message),
            ConversationTurn::assistant(&synthesis.answer, synthesis.attributions.clone()),
        );

        let strategy_used = if result.partial {
            StrategyUsed::StepCapForced {
                strategy: decision.strategy,
            }
        } else {
            StrategyUsed::Completed {
                strategy: decision.strategy,
            }
        };

        let usage = Usage::new(
            result.usage.input_tokens + synthesis.usage.input_tokens,
            result.usage.output_tokens + synthesis.usage.output_tokens,
        );

        let invocation_timings: Vec<InvocationTiming> = result
            .records
            .iter()
            .map(|r| InvocationTiming {
                capability: r.capability.clone(),
                duration: r.duration(),
            })
            .collect();

        tracing::info!(
            %conversation_id,
            strategy = %decision.strategy,
            forced = strategy_used.was_forced(),
            invocations = invocation_timings.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            confidence = synthesis.confidence,
            "Turn completed"
        );

        Ok(TurnOutcome {
            answer: synthesis.answer,
            attributions: synthesis.attributions,
            confidence: synthesis.confidence,
            strategy_used,
            usage,
            invocation_timings,
        })
    }

    /// Drop all state for a conversation. Returns true if it existed.
    pub fn reset_conversation(&self, conversation_id: ConversationId) -> bool {
        self.memory.reset(conversation_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityCategory, CapabilityDescriptor, MockCapability, ParameterSpec,
    };
    use crate::classifier::RoutingStrategy;
    use crate::probe::MockProbe;
    use crate::synthesizer::NO_INFORMATION_MARKER;
    use std::time::Duration;
    use switchyard_llm::{CompletionResponse, ContentBlock, MockBackend, StopReason};
    use switchyard_memory::{MockRetriever, RetrievedChunk};
    use switchyard_types::AttributionKind;

    fn doc_descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "document_search",
            "Search the uploaded document corpus",
            CapabilityCategory::Documents,
        )
        .with_service("vector-index")
    }

    fn bank_descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "bank_lookup",
            "Look up a bank's RSSD identifier by name",
            CapabilityCategory::ExternalData,
        )
        .with_parameter("name", ParameterSpec::required("string", "Bank legal name"))
        .with_service("ffiec-api")
    }

    fn tool_use_response(id: &str, name: &str, args: serde_json::Value) -> CompletionResponse {
        CompletionResponse::new(
            format!("msg_{id}"),
            "test-model",
            vec![ContentBlock::tool_use(id, name, args)],
            StopReason::ToolUse,
            switchyard_llm::Usage::new(20, 10),
        )
    }

    fn orchestrator(
        backend: Arc<MockBackend>,
        retriever: MockRetriever,
        registry: CapabilityRegistry,
        probe: MockProbe,
        config: AgentConfig,
    ) -> Orchestrator {
        Orchestrator::with_config(
            backend,
            Arc::new(retriever),
            registry,
            ProbeCache::new(Arc::new(probe)),
            config,
        )
    }

    fn fast_config() -> AgentConfig {
        AgentConfig {
            backend_retries: 1,
            backend_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_document_question_with_empty_retrieval_refuses() {
        // One document capability, nothing external; the lexicon routes to
        // documents, retrieval finds nothing usable.
        let mut registry = CapabilityRegistry::new();
        registry.register(MockCapability::new(doc_descriptor()));

        let orchestrator = orchestrator(
            Arc::new(MockBackend::new(vec![])),
            MockRetriever::empty(),
            registry,
            MockProbe::new().with_service("vector-index", true),
            fast_config(),
        );

        let outcome = orchestrator
            .start_turn(
                ConversationId::new(),
                "what does the uploaded policy say about parental leave",
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.strategy_used.strategy(),
            RoutingStrategy::DocumentsOnly
        );
        assert!(outcome.answer.contains(NO_INFORMATION_MARKER));
        assert!(outcome.attributions.is_empty());
        assert!(outcome.confidence <= 0.3);
        assert!(!outcome.strategy_used.was_forced());
    }

    #[tokio::test]
    async fn test_tool_lookup_answers_with_tool_attribution() {
        let mut registry = CapabilityRegistry::new();
        registry.register(
            MockCapability::new(bank_descriptor())
                .with_payload(serde_json::json!({"rssd": 12345})),
        );

        let backend = Arc::new(MockBackend::new(vec![
            tool_use_response("call_1", "bank_lookup", serde_json::json!({"name": "Acme Bank"})),
            CompletionResponse::text_only("Acme Bank's RSSD id is 12345, per bank_lookup."),
        ]));

        let orchestrator = orchestrator(
            backend,
            MockRetriever::empty(),
            registry,
            MockProbe::new().with_service("ffiec-api", true),
            fast_config(),
        );

        let conversation = ConversationId::new();
        let outcome = orchestrator
            .start_turn(conversation, "look up Acme Bank's RSSD id")
            .await
            .unwrap();

        assert_eq!(outcome.strategy_used.strategy(), RoutingStrategy::ToolsOnly);
        assert!(outcome.answer.contains("12345"));
        assert_eq!(outcome.attributions.len(), 1);
        assert_eq!(outcome.attributions[0].kind, AttributionKind::Tool);
        assert_eq!(outcome.attributions[0].identifier, "bank_lookup");
        assert_eq!(outcome.invocation_timings.len(), 1);
        assert_eq!(outcome.invocation_timings[0].capability, "bank_lookup");

        // Both turns of the exchange were recorded together.
        assert_eq!(orchestrator.memory().turn_count(conversation), 2);
    }

    #[tokio::test]
    async fn test_unavailable_document_service_routes_away_from_documents() {
        // The only document capability loses its backing service; the
        // catalog excludes it and the turn answers directly, never citing
        // a document.
        let mut registry = CapabilityRegistry::new();
        registry.register(MockCapability::new(doc_descriptor()));

        let backend = Arc::new(MockBackend::with_text("Happy to help in general terms."));
        let orchestrator = orchestrator(
            backend,
            MockRetriever::with_chunks(vec![RetrievedChunk::new("stale", "doc#1", 0.99)]),
            registry,
            MockProbe::new().with_service("vector-index", false),
            fast_config(),
        );

        let outcome = orchestrator
            .start_turn(
                ConversationId::new(),
                "what does the uploaded policy say about leave",
            )
            .await
            .unwrap();

        assert_eq!(outcome.strategy_used.strategy(), RoutingStrategy::None);
        assert!(outcome
            .attributions
            .iter()
            .all(|a| a.kind != AttributionKind::Document));
        assert!(outcome.attributions.is_empty());
    }

    #[tokio::test]
    async fn test_step_cap_forces_partial_synthesis() {
        let mut registry = CapabilityRegistry::new();
        registry.register(
            MockCapability::new(bank_descriptor()).with_payload(serde_json::json!({"rssd": 1})),
        );

        // The planner never finishes; after the cap a synthesis call
        // composes from the two gathered results.
        let backend = Arc::new(MockBackend::new(vec![
            tool_use_response("call_1", "bank_lookup", serde_json::json!({"name": "Acme"})),
            tool_use_response("call_2", "bank_lookup", serde_json::json!({"name": "Globex"})),
            CompletionResponse::text_only("So far I found RSSD 1; the answer may be incomplete."),
        ]));

        let orchestrator = orchestrator(
            backend,
            MockRetriever::empty(),
            registry,
            MockProbe::new().with_service("ffiec-api", true),
            AgentConfig {
                max_steps: 2,
                ..fast_config()
            },
        );

        let outcome = orchestrator
            .start_turn(ConversationId::new(), "look up the RSSD of every bank")
            .await
            .unwrap();

        assert!(outcome.strategy_used.was_forced());
        assert_eq!(outcome.strategy_used.strategy(), RoutingStrategy::ToolsOnly);
        assert_eq!(outcome.invocation_timings.len(), 2);
        // Partial-answer penalty applies.
        assert!(outcome.confidence < 0.6);
        assert!(outcome.answer.contains("incomplete"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_turn_and_leaves_no_memory() {
        let mut registry = CapabilityRegistry::new();
        registry.register(MockCapability::new(bank_descriptor()));

        let orchestrator = orchestrator(
            Arc::new(MockBackend::unreachable()),
            MockRetriever::empty(),
            registry,
            MockProbe::new().with_service("ffiec-api", true),
            fast_config(),
        );

        let conversation = ConversationId::new();
        let err = orchestrator
            .start_turn(conversation, "look up Acme Bank's RSSD id")
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(orchestrator.memory().turn_count(conversation), 0);
    }

    #[tokio::test]
    async fn test_cancelled_turn_leaves_no_memory() {
        let mut registry = CapabilityRegistry::new();
        registry.register(MockCapability::new(bank_descriptor()));

        let orchestrator = orchestrator(
            Arc::new(MockBackend::with_text("never delivered")),
            MockRetriever::empty(),
            registry,
            MockProbe::new().with_service("ffiec-api", true),
            fast_config(),
        );

        let token = CancellationToken::new();
        token.cancel();

        let conversation = ConversationId::new();
        let err = orchestrator
            .start_turn_with_cancellation(conversation, "look up Acme Bank", token)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(orchestrator.memory().turn_count(conversation), 0);
    }

    #[tokio::test]
    async fn test_history_flows_into_following_turns() {
        // Empty registry: every turn routes None and answers directly, so
        // the transcript growth is easy to observe.
        let backend = Arc::new(MockBackend::new(vec![
            CompletionResponse::text_only("First answer."),
            CompletionResponse::text_only("Second answer."),
        ]));

        let orchestrator = orchestrator(
            backend.clone(),
            MockRetriever::empty(),
            CapabilityRegistry::new(),
            MockProbe::new(),
            fast_config(),
        );

        let conversation = ConversationId::new();
        orchestrator
            .start_turn(conversation, "first question")
            .await
            .unwrap();
        orchestrator
            .start_turn(conversation, "second question")
            .await
            .unwrap();

        assert_eq!(orchestrator.memory().turn_count(conversation), 4);

        // The second direct completion saw the first exchange.
        let second_request = &backend.requests()[1];
        assert_eq!(second_request.messages.len(), 3);
        assert_eq!(second_request.messages[0].to_text(), "first question");
        assert_eq!(second_request.messages[1].to_text(), "First answer.");
    }

    #[tokio::test]
    async fn test_file_config_flows_into_memory_probe_and_model() {
        let file = SwitchyardConfig::from_toml(
            r#"
[llm]
model = "local-model"

[memory]
max_turns = 2

[probe]
ttl_secs = 0
"#,
        )
        .unwrap();

        let mut registry = CapabilityRegistry::new();
        registry.register(MockCapability::new(bank_descriptor()));

        let backend = Arc::new(MockBackend::new(vec![
            CompletionResponse::text_only("First answer."),
            CompletionResponse::text_only("Second answer."),
        ]));
        let probe = Arc::new(MockProbe::new().with_service("ffiec-api", true));

        let orchestrator = Orchestrator::from_file_config(
            backend.clone(),
            Arc::new(MockRetriever::empty()),
            registry,
            probe.clone(),
            &file,
        );

        let conversation = ConversationId::new();
        orchestrator
            .start_turn(conversation, "look up Acme Bank")
            .await
            .unwrap();
        orchestrator
            .start_turn(conversation, "look up Globex Bank")
            .await
            .unwrap();

        // [memory].max_turns bounds the window: two exchanges, two kept.
        assert_eq!(orchestrator.memory().turn_count(conversation), 2);

        // [llm].model reaches every completion request.
        assert!(backend.requests().iter().all(|r| r.model == "local-model"));

        // [probe].ttl_secs = 0 means no verdict is ever fresh, so each
        // turn's catalog build re-probes the service.
        assert_eq!(probe.check_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_conversation() {
        let orchestrator = orchestrator(
            Arc::new(MockBackend::with_text("Hello!")),
            MockRetriever::empty(),
            CapabilityRegistry::new(),
            MockProbe::new(),
            fast_config(),
        );

        let conversation = ConversationId::new();
        orchestrator.start_turn(conversation, "hi").await.unwrap();
        assert_eq!(orchestrator.memory().turn_count(conversation), 2);

        assert!(orchestrator.reset_conversation(conversation));
        assert_eq!(orchestrator.memory().turn_count(conversation), 0);
        assert!(!orchestrator.reset_conversation(conversation));
    }
}
