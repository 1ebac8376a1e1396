//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick JSON or human-readable output from config
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON format for production, pretty format for development

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Default directives when neither `RUST_LOG` nor config say otherwise.
fn default_directives(level: &str) -> String {
    format!("localp2p={level},tower_http={level}")
}

/// Build the filter for `config`, preferring `RUST_LOG` when present.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(&config.log_level).into())
}

/// Install the global subscriber.
///
/// Returns an error if a subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_crate_and_http() {
        assert_eq!(default_directives("debug"), "localp2p=debug,tower_http=debug");
    }

    #[test]
    fn second_init_is_an_error() {
        let config = ObservabilityConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
