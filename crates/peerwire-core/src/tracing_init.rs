//! Logging setup for the relay binary.
//!
//! `RUST_LOG` takes precedence over `log.filter`. A malformed filter is a
//! configuration error instead of a silently empty log.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Parse `rust_log` if set, the configured filter otherwise.
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> Result<EnvFilter> {
    let directives = rust_log.unwrap_or(&config.filter);
    EnvFilter::try_new(directives)
        .map_err(|e| Error::Config(format!("Invalid log filter {directives:?}: {e}")))
}

/// Install the global subscriber described by `config`.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(config, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_is_used_without_rust_log() {
        let config = LogConfig::default();
        let filter = build_filter(&config, None);
        assert!(filter.is_ok());
    }

    #[test]
    fn malformed_configured_filter_is_a_config_error() {
        let config = LogConfig {
            filter: "peerwire_relay=loud".to_string(),
            json: false,
        };
        assert!(matches!(build_filter(&config, None), Err(Error::Config(_))));
    }

    #[test]
    fn rust_log_overrides_configured_filter() {
        let config = LogConfig {
            filter: "peerwire_relay=loud".to_string(),
            json: false,
        };
        assert!(build_filter(&config, Some("peerwire_relay=debug")).is_ok());
        assert!(build_filter(&LogConfig::default(), Some("x=nope")).is_err());
    }
}
