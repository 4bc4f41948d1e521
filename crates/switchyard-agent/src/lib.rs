//! The Switchyard agent core.
//!
//! This crate ties the conversation loop together: capabilities register
//! themselves with health-probed service requirements, each turn builds a
//! catalog snapshot of what is actually usable, a classifier routes the
//! query, a bounded plan/act/observe loop gathers evidence, and a
//! synthesizer produces an attributed, grounded answer.
//!
//! [`Orchestrator`] is the entry point:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use switchyard_agent::{CapabilityRegistry, Orchestrator, ProbeCache};
//! # async fn example(
//! #     backend: switchyard_llm::SharedBackend,
//! #     retriever: switchyard_memory::SharedRetriever,
//! #     probe: switchyard_agent::SharedProbe,
//! # ) -> switchyard_agent::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     backend,
//!     retriever,
//!     CapabilityRegistry::new(),
//!     ProbeCache::new(probe),
//! );
//! let outcome = orchestrator
//!     .start_turn(switchyard_types::ConversationId::new(), "hello")
//!     .await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod catalog;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod probe;
pub mod synthesizer;
pub mod types;

pub use capability::{
    Capability, CapabilityCategory, CapabilityDescriptor, CapabilityFailure, CapabilityRegistry,
    InvocationContext, ParameterSpec, SharedCapability,
};
pub use catalog::{CapabilityCatalog, CatalogBuilder};
pub use classifier::{QueryClassifier, RoutingDecision, RoutingStrategy};
pub use error::{AgentError, Result};
pub use executor::{AgentExecutionLoop, InvocationOutcome, LoopResult, ToolInvocationRecord};
pub use orchestrator::Orchestrator;
pub use probe::{AvailabilityProbe, MockProbe, ProbeCache, ServiceAvailability, SharedProbe};
pub use synthesizer::{ResponseSynthesizer, Synthesis, NO_INFORMATION_ANSWER};
pub use types::{AgentConfig, InvocationTiming, StrategyUsed, TurnOutcome};
