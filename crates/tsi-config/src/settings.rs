//! Client configuration: behavior toggles and pipeline limits.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum statement length accepted by the server, in characters.
pub const DEFAULT_MAX_SQL_LENGTH: usize = 1_048_576;

/// Attempts per logical insert before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_POOL_MAX_IDLE: usize = 8;

/// Complete client configuration.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fail instead of warn when a value would be coerced by the server.
    pub strict_type_check: bool,

    /// Decode fixed-width binary result columns as UTF-8 text.
    pub decode_binary_as_text: bool,

    /// Log statement text at DEBUG level.
    pub debug_log: bool,

    /// Upper bound on a single multi-row INSERT statement, in characters.
    pub max_sql_length: usize,

    /// Attempts per insert, counting the first one.
    pub max_attempts: u32,

    /// Per-request timeout for the REST transport.
    pub http_timeout_secs: u64,

    /// Idle native connections kept for reuse.
    pub pool_max_idle: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            strict_type_check: false,
            decode_binary_as_text: false,
            debug_log: true,
            max_sql_length: DEFAULT_MAX_SQL_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn parse_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_strict_type_check(mut self, enabled: bool) -> Self {
        self.strict_type_check = enabled;
        self
    }

    pub fn with_decode_binary_as_text(mut self, enabled: bool) -> Self {
        self.decode_binary_as_text = enabled;
        self
    }

    pub fn with_debug_log(mut self, enabled: bool) -> Self {
        self.debug_log = enabled;
        self
    }

    pub fn with_max_sql_length(mut self, max: usize) -> Self {
        self.max_sql_length = max;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        // "INSERT INTO " plus one fragment and the terminator must fit
        if self.max_sql_length < 64 {
            return Err(ConfigError::Invalid(format!(
                "max_sql_length {} is too small",
                self.max_sql_length
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
