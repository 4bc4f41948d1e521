//! Agent configuration and the caller-facing turn outcome.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use switchyard_llm::Usage;
use switchyard_types::SourceAttribution;

use crate::classifier::RoutingStrategy;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunable settings for one agent instance.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Maximum plan/act/observe steps per turn.
    pub max_steps: usize,
    /// Per-invocation timeout for capability calls.
    pub invocation_timeout: Duration,
    /// Timeout for the LLM classification call.
    pub classify_timeout: Duration,
    /// Chunks requested per retrieval pass.
    pub retrieval_k: usize,
    /// Minimum similarity score for a chunk to be used.
    pub retrieval_threshold: f32,
    /// Prior turns supplied as context to planning and classification.
    pub history_window: usize,
    /// Transient-error retries per backend call.
    pub backend_retries: u32,
    /// Initial backoff between backend retries.
    pub backend_backoff: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            max_steps: 5,
            invocation_timeout: Duration::from_secs(30),
            classify_timeout: Duration::from_secs(10),
            retrieval_k: 5,
            retrieval_threshold: 0.35,
            history_window: 10,
            backend_retries: 2,
            backend_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&switchyard_config::SwitchyardConfig> for AgentConfig {
    /// Build from the loaded file config. Settings the file does not
    /// carry keep their defaults.
    fn from(config: &switchyard_config::SwitchyardConfig) -> Self {
        let llm = config.llm();
        let agent = config.agent();
        Self {
            model: llm.model,
            max_tokens: llm.max_tokens,
            max_steps: agent.max_steps,
            invocation_timeout: Duration::from_secs(agent.invocation_timeout_secs),
            retrieval_k: agent.retrieval_k,
            retrieval_threshold: agent.retrieval_threshold,
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// How the turn's strategy played out.
///
/// Forced termination (the step cap) is reported distinctly from a clean
/// finish under the same strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "termination", rename_all = "snake_case")]
pub enum StrategyUsed {
    /// The turn finished on its own.
    Completed {
        /// The strategy that ran.
        strategy: RoutingStrategy,
    },
    /// The step cap forced synthesis from partial results.
    StepCapForced {
        /// The strategy that ran.
        strategy: RoutingStrategy,
    },
}

impl StrategyUsed {
    /// The strategy that ran, regardless of how it ended.
    pub fn strategy(&self) -> RoutingStrategy {
        match self {
            Self::Completed { strategy } | Self::StepCapForced { strategy } => *strategy,
        }
    }

    /// Whether the step cap forced termination.
    pub fn was_forced(&self) -> bool {
        matches!(self, Self::StepCapForced { .. })
    }
}

/// Duration of one capability invocation, for per-turn accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationTiming {
    /// The capability invoked.
    pub capability: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// What one turn hands back to the caller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The synthesized answer text.
    pub answer: String,
    /// Citations backing the answer, in presentation order.
    pub attributions: Vec<SourceAttribution>,
    /// Overall confidence in [0, 1].
    pub confidence: f32,
    /// Strategy and termination mode.
    pub strategy_used: StrategyUsed,
    /// Token usage across every completion call in the turn.
    pub usage: Usage,
    /// Per-invocation durations, in execution order.
    pub invocation_timings: Vec<InvocationTiming>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_used_reports_forced_termination() {
        let clean = StrategyUsed::Completed {
            strategy: RoutingStrategy::ToolsOnly,
        };
        let forced = StrategyUsed::StepCapForced {
            strategy: RoutingStrategy::ToolsOnly,
        };

        assert_eq!(clean.strategy(), forced.strategy());
        assert!(!clean.was_forced());
        assert!(forced.was_forced());
    }

    #[test]
    fn test_default_config_bounds() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.invocation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_file_sections() {
        let file = switchyard_config::SwitchyardConfig::from_toml(
            r#"
[llm]
model = "local-model"

[agent]
max_steps = 3
invocation_timeout_secs = 10
"#,
        )
        .unwrap();

        let config = AgentConfig::from(&file);
        assert_eq!(config.model, "local-model");
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.invocation_timeout, Duration::from_secs(10));
        // Not represented in the file config.
        assert_eq!(config.history_window, 10);
    }
}
