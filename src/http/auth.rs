//! Credential resolution.
//!
//! Process-wide defaults apply unless the request carries an
//! `Authorization` header, which must use the `Basic` scheme.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::config::CredentialsConfig;

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The `Authorization` header uses a scheme other than `Basic`.
    #[error("Unsupported authentication scheme: {0}")]
    UnsupportedScheme(String),

    /// The `Basic` payload is not base64 of `user:password`.
    #[error("Malformed credentials")]
    MalformedCredentials,

    /// No user or no password is known when a session is needed.
    #[error("No username/password specified")]
    MissingCredentials,

    /// The database rejected the credentials.
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

/// A user/password pair; either part may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    /// Both parts, if both are present and non-empty.
    pub fn complete(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

impl From<&CredentialsConfig> for Credentials {
    fn from(config: &CredentialsConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }
}

/// Resolve the credentials of a request.
pub fn resolve_credentials(
    headers: &HeaderMap,
    defaults: &Credentials,
) -> Result<Credentials, AuthError> {
    match headers.get(header::AUTHORIZATION) {
        None => Ok(defaults.clone()),
        Some(value) => {
            let value = value.to_str().map_err(|_| AuthError::MalformedCredentials)?;
            parse_basic(value)
        }
    }
}

/// Parse an `Authorization` header value of the form `Basic base64(user:password)`.
pub fn parse_basic(value: &str) -> Result<Credentials, AuthError> {
    let (scheme, payload) = value.split_once(' ').unwrap_or((value, ""));
    if scheme != "Basic" {
        return Err(AuthError::UnsupportedScheme(scheme.to_string()));
    }

    let decoded = STANDARD
        .decode(payload.trim())
        .map_err(|_| AuthError::MalformedCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;
    let (user, password) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedCredentials)?;

    Ok(Credentials::new(user, password))
}
