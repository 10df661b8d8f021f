//! Optional subscriber setup for hosts that have none of their own.
//!
//! `RUST_LOG` wins when set; otherwise the level follows the `debug` flag.
//! Installing twice returns an error rather than panicking.

use tracing_subscriber::{fmt, EnvFilter};

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn default_filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a global fmt subscriber, as JSON lines when `json` is set.
pub fn init_logging(debug: bool, json: bool) -> Result<(), InitError> {
    let filter = default_filter(debug);
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    }
}
