//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Derive the default filter from the logging settings
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - Quiet mode keeps warnings and errors only

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_directive(config: &LoggingConfig) -> &str {
    if config.quiet {
        "warn"
    } else {
        &config.level
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_level() {
        let mut config = LoggingConfig::default();
        assert_eq!(default_directive(&config), "info");

        config.level = "debug".into();
        assert_eq!(default_directive(&config), "debug");

        config.quiet = true;
        assert_eq!(default_directive(&config), "warn");
    }
}
