//! Configuration validation.
//!
//! # Responsibilities
//! - Reject port sets where any two ports coincide
//! - Check value ranges the deserializer cannot express
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before any listener is bound

use thiserror::Error;

use crate::config::schema::{PortConfig, ServiceConfig};

/// A semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Two of the configured ports are equal.
    #[error("Port {0} was specified twice")]
    DuplicatePort(u16),

    /// The request timeout must be positive.
    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,

    /// The database server needs at least one connection slot.
    #[error("Database connection limit must be greater than zero")]
    ZeroConnections,
}

/// Check that the four ports are pairwise distinct.
///
/// On collision the reported port is the first one of
/// (server, event, http) that collides with a later one.
pub fn validate_ports(ports: &PortConfig) -> Result<(), ValidationError> {
    let PortConfig {
        server,
        event,
        http,
        stop,
    } = *ports;

    let same = if server == event || server == http || server == stop {
        Some(server)
    } else if event == http || event == stop {
        Some(event)
    } else if http == stop {
        Some(http)
    } else {
        None
    };

    match same {
        Some(port) => Err(ValidationError::DuplicatePort(port)),
        None => Ok(()),
    }
}

/// Validate the complete configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_ports(&config.ports) {
        errors.push(e);
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if config.database.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(server: u16, event: u16, http: u16, stop: u16) -> PortConfig {
        PortConfig {
            server,
            event,
            http,
            stop,
        }
    }

    #[test]
    fn distinct_ports_pass() {
        assert_eq!(validate_ports(&ports(1984, 1985, 8984, 8985)), Ok(()));
    }

    #[test]
    fn every_colliding_pair_is_rejected() {
        let cases = [
            (ports(1, 1, 3, 4), 1),
            (ports(1, 2, 1, 4), 1),
            (ports(1, 2, 3, 1), 1),
            (ports(1, 2, 2, 4), 2),
            (ports(1, 2, 3, 2), 2),
            (ports(1, 2, 3, 3), 3),
        ];
        for (config, expected) in cases {
            assert_eq!(
                validate_ports(&config),
                Err(ValidationError::DuplicatePort(expected)),
                "{config:?}"
            );
        }
    }

    #[test]
    fn error_names_the_port() {
        let err = validate_ports(&ports(8984, 1985, 8984, 8985)).unwrap_err();
        assert_eq!(err.to_string(), "Port 8984 was specified twice");
    }

    #[test]
    fn validate_config_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.ports.stop = config.ports.http;
        config.http.request_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::DuplicatePort(config.ports.http)));
        assert!(errors.contains(&ValidationError::ZeroTimeout));
    }
}
