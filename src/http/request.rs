//! Request parsing helpers.
//!
//! # Responsibilities
//! - Split paths into segments
//! - Parse `Accept` and `Content-Type` headers
//! - Decode query strings
//!
//! # Design Decisions
//! - Pure functions over raw header/path strings; no normalization beyond
//!   what each function documents

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use thiserror::Error;

/// Errors in request headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Invalid {0} header")]
    InvalidHeader(&'static str),
}

/// Split a path on `/`, dropping empty components.
///
/// `"/a//b/c/"` yields `["a", "b", "c"]`; an empty or absent path yields no segments.
pub fn to_segments(path: Option<&str>) -> Vec<String> {
    path.map(|p| {
        p.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Join `segments[from..]` with `/`.
pub fn join_segments(segments: &[String], from: usize) -> String {
    segments.get(from..).map(|s| s.join("/")).unwrap_or_default()
}

/// Strip a `;parameter` suffix from a media type.
pub fn strip_parameters(media_type: &str) -> &str {
    media_type
        .split_once(';')
        .map_or(media_type, |(head, _)| head)
        .trim()
}

/// Parse an `Accept` header into media types, in header order, without parameters.
pub fn parse_accept(headers: &HeaderMap) -> Result<Vec<String>, RequestError> {
    let value = headers
        .get(header::ACCEPT)
        .ok_or(RequestError::MissingHeader("Accept"))?
        .to_str()
        .map_err(|_| RequestError::InvalidHeader("Accept"))?;

    Ok(value
        .split(',')
        .map(strip_parameters)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect())
}

/// The request content type without parameters, if present and readable.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| strip_parameters(v).to_string())
}

/// Decode a query string. Later duplicates replace earlier values.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}
