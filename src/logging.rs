//! Logging setup for the `snips` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever embeds it.

use crate::error::{Result, SnipError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "SNIPS_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or filter directive: trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: text or json
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_env_filter(config)?;
    let registry = Registry::default().with(filter);

    let installed = match config.format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        "text" => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        other => {
            return Err(SnipError::Config(format!(
                "logging.format must be text or json, got '{}'",
                other
            )))
        }
    };

    installed.map_err(|e| SnipError::Config(format!("logging already initialised: {}", e)))
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level)
        .map_err(|e| SnipError::Config(format!("invalid log level '{}': {}", config.level, e)))
}
