//! Error types for the config crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the config error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read a config file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Config file contained invalid TOML.
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// Parser error text.
        message: String,
    },

    /// A required value is missing.
    #[error("Missing configuration value: {0}")]
    Missing(String),
}
