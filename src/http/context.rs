//! Per-request context.
//!
//! A [`RequestContext`] is built once per request by the dispatcher and owns
//! everything derived from it: path segments, query parameters, credentials,
//! the response under construction, and at most one database session.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use uuid::Uuid;

use crate::http::auth::{resolve_credentials, AuthError, Credentials};
use crate::http::dispatch::ServiceError;
use crate::http::request::{self, RequestError};
use crate::http::response::{ResponseParts, SerializerOptions};
use crate::session::{Session, SessionFactory};

const REQUEST_ID: &str = "x-request-id";

/// State of a single HTTP request.
pub struct RequestContext {
    id: String,
    method: Method,
    segments: Vec<String>,
    path: String,
    query: Option<String>,
    params: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
    credentials: Credentials,
    sessions: Arc<SessionFactory>,
    session: Option<Session>,
    response: ResponseParts,
}

impl RequestContext {
    /// Build the context for a request addressed to a service mounted at `mount`.
    ///
    /// Fails if an `Authorization` header is present but unusable.
    pub fn new(
        parts: &Parts,
        body: Bytes,
        mount: &str,
        defaults: &Credentials,
        sessions: Arc<SessionFactory>,
    ) -> Result<Self, AuthError> {
        let credentials = resolve_credentials(&parts.headers, defaults)?;

        let full_path = parts.uri.path();
        let relative = full_path.strip_prefix(mount).unwrap_or(full_path);
        // Decoded once, before segmentation: `%2F` addresses a nested path.
        let relative = percent_decode_str(relative).decode_utf8_lossy();
        let segments = request::to_segments(Some(relative.as_ref()));
        let path = request::join_segments(&segments, 0);
        let query = parts.uri.query().map(str::to_string);

        let id = parts
            .headers
            .get(REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            id,
            method: parts.method.clone(),
            params: request::parse_query(query.as_deref()),
            segments,
            path,
            query,
            headers: parts.headers.clone(),
            body,
            credentials,
            sessions,
            session: None,
            response: ResponseParts::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// All segments joined with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The addressed database (first segment), if any.
    pub fn db(&self) -> Option<&str> {
        self.segment(0)
    }

    /// The path inside the database (all segments after the first).
    pub fn db_path(&self) -> String {
        request::join_segments(&self.segments, 1)
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request content type without parameters.
    pub fn content_type(&self) -> Option<String> {
        request::content_type(&self.headers)
    }

    /// Accepted media types, in header order.
    pub fn produces(&self) -> Result<Vec<String>, RequestError> {
        request::parse_accept(&self.headers)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replace the credentials used by a session opened later.
    pub fn set_credentials(&mut self, user: impl Into<String>, password: impl Into<String>) {
        self.credentials = Credentials::new(user, password);
    }

    /// The session of this request, opened on first use.
    pub async fn session(&mut self) -> Result<&mut Session, ServiceError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let (user, password) = self
                    .credentials
                    .complete()
                    .ok_or(AuthError::MissingCredentials)?;
                let session = self.sessions.open(user, password).await?;
                tracing::debug!(request_id = %self.id, user, "Session opened");
                session
            }
        };
        Ok(self.session.insert(session))
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Close the session, if one is open. Later calls do nothing.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(request_id = %self.id, error = %e, "Closing session failed");
            }
        }
    }

    /// Set the content type from serialization settings.
    pub fn init_response(&mut self, options: &SerializerOptions) -> Result<(), ServiceError> {
        self.response.init(options)?;
        Ok(())
    }

    /// Append bytes to the response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.write(bytes);
    }

    /// Close the session, then set the status and an optional message body.
    pub async fn status(&mut self, status: StatusCode, message: Option<&str>) {
        self.close().await;
        self.response.set_status(status, message);
    }

    /// Discard the response so far and answer with an error.
    pub fn send_error(&mut self, status: StatusCode, message: &str) {
        self.response = ResponseParts::error(status, message);
    }

    pub fn response(&self) -> &ResponseParts {
        &self.response
    }

    /// Consume the context. Call [`RequestContext::close`] first.
    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("segments", &self.segments)
            .field("user", &self.credentials.user)
            .field("session", &self.session.is_some())
            .finish()
    }
}
