//! Configuration system for the Switchyard agent core.
//!
//! TOML-based configuration with:
//! - `[llm]`, `[agent]`, `[memory]`, `[probe]` sections with sane defaults
//! - Config file layering (XDG user config + project-local overrides)
//! - API key resolution (config file → environment variable)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, xdg_config_path, ConfigSource, LoadedConfig,
    PROJECT_CONFIG_FILE,
};
pub use error::{ConfigError, Result};
pub use types::{AgentSection, LlmSection, MemorySection, ProbeSection, SwitchyardConfig};
