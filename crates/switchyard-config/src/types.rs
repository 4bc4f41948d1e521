//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]      # completion backend
//! [agent]    # loop and routing settings
//! [memory]   # conversation window
//! [probe]    # availability probing
//! ```

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Maps to the full TOML config file. All sections are optional so that
/// partial configs (e.g., project-local overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Completion backend configuration.
    pub llm: Option<LlmSection>,

    /// Agent loop and routing configuration.
    pub agent: Option<AgentSection>,

    /// Conversation memory configuration.
    pub memory: Option<MemorySection>,

    /// Availability probe configuration.
    pub probe: Option<ProbeSection>,
}

impl SwitchyardConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per-section: a section present in `other` replaces the
    /// whole section here.
    pub fn merge(&mut self, other: SwitchyardConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
        if other.probe.is_some() {
            self.probe = other.probe;
        }
    }

    /// The llm section, defaulted if absent.
    pub fn llm(&self) -> LlmSection {
        self.llm.clone().unwrap_or_default()
    }

    /// The agent section, defaulted if absent.
    pub fn agent(&self) -> AgentSection {
        self.agent.clone().unwrap_or_default()
    }

    /// The memory section, defaulted if absent.
    pub fn memory(&self) -> MemorySection {
        self.memory.clone().unwrap_or_default()
    }

    /// The probe section, defaulted if absent.
    pub fn probe(&self) -> ProbeSection {
        self.probe.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Section
// ─────────────────────────────────────────────────────────────────────────────

/// Completion backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// API key. Prefer leaving this unset and exporting the environment
    /// variable instead; plaintext keys in config files are discouraged.
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,

    /// Maximum tokens per completion.
    pub max_tokens: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl LlmSection {
    /// Resolve the API key: config value first, then the configured
    /// environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    /// Whether a plaintext key is stored in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent Section
// ─────────────────────────────────────────────────────────────────────────────

/// Agent loop and routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Maximum plan/act/observe steps per turn.
    pub max_steps: usize,

    /// Per-invocation timeout for capability calls, in seconds.
    pub invocation_timeout_secs: u64,

    /// Number of document chunks requested per retrieval.
    pub retrieval_k: usize,

    /// Minimum similarity score for a retrieved chunk to be used.
    pub retrieval_threshold: f32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 5,
            invocation_timeout_secs: 30,
            retrieval_k: 5,
            retrieval_threshold: 0.35,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Section
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Turns retained per conversation.
    pub max_turns: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe Section
// ─────────────────────────────────────────────────────────────────────────────

/// Availability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    /// Probe timeout in seconds. A probe exceeding this counts as
    /// unavailable.
    pub timeout_secs: u64,

    /// How long a probe result stays fresh, in seconds.
    pub ttl_secs: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            ttl_secs: 300,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwitchyardConfig::new();
        assert_eq!(config.agent().max_steps, 5);
        assert_eq!(config.agent().invocation_timeout_secs, 30);
        assert_eq!(config.memory().max_turns, 20);
        assert_eq!(config.probe().ttl_secs, 300);
        assert_eq!(config.probe().timeout_secs, 5);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = SwitchyardConfig::from_toml(
            r#"
[agent]
max_steps = 8

[probe]
ttl_secs = 60
"#,
        )
        .unwrap();

        assert_eq!(config.agent().max_steps, 8);
        // Unset fields within a present section fall back to defaults.
        assert_eq!(config.agent().invocation_timeout_secs, 30);
        assert_eq!(config.probe().ttl_secs, 60);
        assert!(config.llm.is_none());
        assert_eq!(config.llm().model, "gpt-4o-mini");
    }

    #[test]
    fn test_merge_section_priority() {
        let mut base = SwitchyardConfig::from_toml(
            r#"
[llm]
model = "base-model"

[memory]
max_turns = 50
"#,
        )
        .unwrap();

        let overlay = SwitchyardConfig::from_toml(
            r#"
[llm]
model = "overlay-model"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.llm().model, "overlay-model");
        // Sections absent from the overlay survive.
        assert_eq!(base.memory().max_turns, 50);
    }

    #[test]
    fn test_resolve_api_key_prefers_config_value() {
        let section = LlmSection {
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(section.resolve_api_key().as_deref(), Some("from-config"));
        assert!(section.has_plaintext_api_key());
    }

    #[test]
    fn test_resolve_api_key_empty_is_unset() {
        let section = LlmSection {
            api_key: Some(String::new()),
            api_key_env: "SWITCHYARD_TEST_KEY_UNSET".to_string(),
            ..Default::default()
        };
        assert!(!section.has_plaintext_api_key());
        assert!(section.resolve_api_key().is_none());
    }
}
