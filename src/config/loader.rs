//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a TOML file without validating it.
///
/// Command-line overrides are applied afterwards, so validation is the
/// caller's job (see [`finalize`]).
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServiceConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Validate a fully assembled configuration.
pub fn finalize(config: ServiceConfig) -> Result<ServiceConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProcessMode;
    use std::io::Write;

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mode = \"client\"\n[ports]\nhttp = 9000\n[credentials]\nuser = \"admin\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mode, ProcessMode::Client);
        assert_eq!(config.ports.http, 9000);
        assert_eq!(config.ports.server, 1984);
        assert_eq!(config.credentials.user.as_deref(), Some("admin"));
        assert!(config.services.rest);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ports\nhttp = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn finalize_reports_duplicate_port() {
        let mut config = ServiceConfig::default();
        config.ports.event = config.ports.server;
        let err = finalize(config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: Port 1984 was specified twice"
        );
    }
}
