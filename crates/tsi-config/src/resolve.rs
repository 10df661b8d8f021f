//! Config resolution: explicit path → `TSINGEST_CONFIG` → XDG config dir →
//! defaults, followed by environment knob overrides.

use crate::error::{ConfigError, Result};
use crate::settings::ClientConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming a config file.
pub const ENV_CONFIG_PATH: &str = "TSINGEST_CONFIG";
/// Strict type checking toggle.
pub const ENV_STRICT_TYPE: &str = "TSINGEST_STRICT_TYPE";
/// Binary-as-text decoding toggle.
pub const ENV_BINARY_AS_TEXT: &str = "TSINGEST_BINARY_AS_TEXT";
/// Statement debug logging toggle.
pub const ENV_DEBUG: &str = "TSINGEST_DEBUG";

const DIR_NAME: &str = "tsingest";
const FILE_NAME: &str = "config.toml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Resolved configuration plus its origin.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ClientConfig,
    pub source: ConfigSource,
}

/// Candidate config file locations, in priority order.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub explicit: Option<PathBuf>,
    pub from_env: Option<PathBuf>,
    pub user_default: Option<PathBuf>,
}

impl ConfigPaths {
    /// Collect candidates from the process environment.
    pub fn discover(explicit: Option<&Path>) -> Self {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            from_env: std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from),
            user_default: dirs::config_dir().map(|dir| dir.join(DIR_NAME).join(FILE_NAME)),
        }
    }
}

/// Resolve configuration from the process environment.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    resolve_config_from(&ConfigPaths::discover(explicit), |key| std::env::var(key).ok())
}

/// Resolve configuration from the given paths and environment lookup.
pub fn resolve_config_from<F>(paths: &ConfigPaths, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, source) = if let Some(path) = &paths.explicit {
        (load_required(path)?, ConfigSource::File(path.clone()))
    } else if let Some(path) = &paths.from_env {
        (load_required(path)?, ConfigSource::File(path.clone()))
    } else if let Some(path) = paths.user_default.as_ref().filter(|p| p.is_file()) {
        (load_file(path)?, ConfigSource::File(path.clone()))
    } else {
        (ClientConfig::default(), ConfigSource::Defaults)
    };

    apply_env_overrides(&mut config, env);
    config.validate()?;
    debug!(source = ?source, "configuration resolved");

    Ok(ResolvedConfig { config, source })
}

/// Apply boolean knob overrides from the environment.
pub fn apply_env_overrides<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env_flag(&env, ENV_STRICT_TYPE) {
        config.strict_type_check = v;
    }
    if let Some(v) = env_flag(&env, ENV_BINARY_AS_TEXT) {
        config.decode_binary_as_text = v;
    }
    if let Some(v) = env_flag(&env, ENV_DEBUG) {
        config.debug_log = v;
    }
}

fn env_flag<F>(env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    let parsed = parse_flag(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring unrecognized boolean");
    }
    parsed
}

/// Parse a boolean knob value.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn load_required(path: &Path) -> Result<ClientConfig> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    load_file(path)
}

fn load_file(path: &Path) -> Result<ClientConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ClientConfig::parse_toml(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
