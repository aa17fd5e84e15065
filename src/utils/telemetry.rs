// src/utils/telemetry.rs
use tracing_subscriber::EnvFilter;

use crate::utils::config::LoggingConfig;
use crate::utils::error::{AuthError, Result};

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AuthError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| AuthError::Config(format!("Failed to install tracing subscriber: {}", e)))
}
