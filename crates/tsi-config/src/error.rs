//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading a config file
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Explicitly requested config file does not exist
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// Semantic validation failed
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Connection URL could not be interpreted
    #[error("invalid connection url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<ConfigError> for tsi_common::Error {
    fn from(err: ConfigError) -> Self {
        tsi_common::Error::InvalidInput(err.to_string())
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
