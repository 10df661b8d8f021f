//! tsingest configuration loading and validation.
//!
//! This crate provides:
//! - [`ClientConfig`], the behavior toggles and limits of a client
//! - Config resolution (explicit path → env → XDG → defaults, then env knobs)
//! - Connection URL parsing into an [`Endpoint`]

pub mod endpoint;
pub mod error;
pub mod resolve;
pub mod settings;

pub use endpoint::{Endpoint, TransportKind, DEFAULT_PASSWORD, DEFAULT_USER};
pub use error::{ConfigError, Result};
pub use resolve::{resolve_config, resolve_config_from, ConfigPaths, ConfigSource, ResolvedConfig};
pub use settings::{ClientConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SQL_LENGTH};
