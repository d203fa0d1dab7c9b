//! Response assembly.
//!
//! # Responsibilities
//! - Infer the content type from serialization settings
//! - Hold the status, headers and body a handler produces
//! - Emit the Basic challenge with every 401
//!
//! # Design Decisions
//! - An explicit media type always wins over inference
//! - The character encoding is always appended to the content type
//! - Bodies are raw bytes; no transcoding happens here

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Default character encoding.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Default output method.
pub const DEFAULT_METHOD: &str = "xml";

/// Challenge sent with every 401.
pub const BASIC_CHALLENGE: &str = "Basic";

/// Serialization settings that drive the response content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    pub encoding: String,
    /// Declared media type; empty means "infer from `method`".
    pub media_type: String,
    pub method: String,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.to_string(),
            media_type: String::new(),
            method: DEFAULT_METHOD.to_string(),
        }
    }
}

impl SerializerOptions {
    /// Read `method`, `media-type` and `encoding` from query parameters.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut options = Self::default();
        if let Some(method) = params.get("method") {
            options.method = method.clone();
        }
        if let Some(media_type) = params.get("media-type") {
            options.media_type = media_type.clone();
        }
        if let Some(encoding) = params.get("encoding") {
            options.encoding = encoding.clone();
        }
        options
    }

    /// The effective content type, including the charset.
    pub fn content_type(&self) -> String {
        let media_type = if self.media_type.is_empty() {
            content_type_for(&self.method)
        } else {
            self.media_type.as_str()
        };
        format!("{media_type}; charset={}", self.encoding)
    }
}

/// Media type inferred from an output method.
pub fn content_type_for(method: &str) -> &'static str {
    match method {
        "raw" => "application/octet-stream",
        "xml" => "application/xml",
        "json" | "jsonml" => "application/json",
        "xhtml" | "html5" | "html" => "text/html",
        _ => "text/plain",
    }
}

/// The response under construction for one request.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Default for ResponseParts {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseParts {
    /// A plain-text error response.
    pub fn error(status: StatusCode, message: &str) -> Self {
        let mut parts = Self::default();
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        );
        parts.set_status(status, Some(message));
        parts
    }

    /// Set the status and, if given, replace the body with `message`.
    pub fn set_status(&mut self, status: StatusCode, message: Option<&str>) {
        self.status = status;
        if status == StatusCode::UNAUTHORIZED {
            self.headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        if let Some(message) = message {
            self.body = message.as_bytes().to_vec();
        }
    }

    /// Set the content type from serialization settings.
    pub fn init(&mut self, options: &SerializerOptions) -> Result<(), header::InvalidHeaderValue> {
        let value = HeaderValue::from_str(&options.content_type())?;
        self.headers.insert(header::CONTENT_TYPE, value);
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }
}

impl IntoResponse for ResponseParts {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
