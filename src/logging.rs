//! Structured logging setup
//!
//! Human-readable or JSON output through `tracing-subscriber`. Logs go to
//! stderr so they never interleave with chat output on stdout.

use crate::config::LoggingConfig;
use crate::error::{NoorError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the filter: `RUST_LOG` wins, then the configured level
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| NoorError::Config(format!("Invalid log filter: {}", e)).into())
}

/// Initialize logging based on configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use noor::config::LoggingConfig;
/// use noor::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "noor=debug".to_string(),
///     json: true,
/// };
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let result = if config.json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()
    };

    result.map_err(|e| NoorError::Config(format!("Failed to initialize logging: {}", e)).into())
}
