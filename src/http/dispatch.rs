//! Handler dispatch and error mapping.
//!
//! # Responsibilities
//! - Build a [`RequestContext`] for every request
//! - Run the service handler
//! - Turn every failure into a status code and a plain-text body
//! - Close the context on every exit path
//!
//! # Design Decisions
//! - Failures are a closed set of kinds; the status comes from one lookup table
//! - Unexpected failures are logged as bugs and answered with a generic message
//! - A handler never sees a request whose credentials failed to resolve

use std::future::Future;

use axum::body::{Body, Bytes};
use axum::http::header::InvalidHeaderValue;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::auth::AuthError;
use crate::http::context::RequestContext;
use crate::http::request::RequestError;
use crate::http::response::ResponseParts;
use crate::http::server::AppState;
use crate::session::SessionError;

/// Largest request body a service accepts.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Message returned for unexpected failures.
pub const UNEXPECTED_MESSAGE: &str = "Unexpected error";

/// Failure kinds, in the order they are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Carries its own status.
    Protocol,
    Authentication,
    Input,
    Evaluation,
    Unexpected,
}

/// Status of each kind that does not carry its own.
const STATUS_TABLE: [(ErrorKind, StatusCode); 4] = [
    (ErrorKind::Authentication, StatusCode::UNAUTHORIZED),
    (ErrorKind::Input, StatusCode::BAD_REQUEST),
    (ErrorKind::Evaluation, StatusCode::BAD_REQUEST),
    (ErrorKind::Unexpected, StatusCode::INTERNAL_SERVER_ERROR),
];

impl ErrorKind {
    fn default_status(self) -> StatusCode {
        STATUS_TABLE
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, |(_, status)| *status)
    }
}

/// Errors a service handler can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A failure with an explicit status; the message is passed through.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Malformed input or a failed read/write.
    #[error("{0}")]
    Input(String),

    /// The database could not evaluate a command.
    #[error("{0}")]
    Evaluation(String),

    #[error("Unexpected error: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

impl ServiceError {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Http { .. } => ErrorKind::Protocol,
            ServiceError::Auth(_) => ErrorKind::Authentication,
            ServiceError::Input(_) => ErrorKind::Input,
            ServiceError::Evaluation(_) => ErrorKind::Evaluation,
            ServiceError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Http { status, .. } => *status,
            other => other.kind().default_status(),
        }
    }

    /// Body sent to the client.
    pub fn message(&self) -> String {
        match self {
            ServiceError::Unexpected(_) => UNEXPECTED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AccessDenied(user) => ServiceError::Auth(AuthError::AccessDenied(user)),
            SessionError::Evaluation(msg) => ServiceError::Evaluation(msg),
            SessionError::NotFound(msg) => ServiceError::http(StatusCode::NOT_FOUND, msg),
            SessionError::Protocol(e) => ServiceError::Input(e.to_string()),
            e @ SessionError::Unavailable(_) => ServiceError::Unexpected(Box::new(e)),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Input(err.to_string())
    }
}

impl From<RequestError> for ServiceError {
    fn from(err: RequestError) -> Self {
        ServiceError::Input(err.to_string())
    }
}

impl From<InvalidHeaderValue> for ServiceError {
    fn from(err: InvalidHeaderValue) -> Self {
        ServiceError::Input(err.to_string())
    }
}

/// A service mounted below a path prefix.
pub trait ServiceHandler: Send + Sync + 'static {
    /// Path prefix, e.g. `/rest`.
    fn mount(&self) -> &'static str;

    /// Handle one request.
    fn run(
        &self,
        ctx: &mut RequestContext,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// Run `handler` for `request` and map its outcome to a response.
pub async fn dispatch<H: ServiceHandler>(
    state: &AppState,
    handler: &H,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    let response = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => run_handler(state, handler, &parts, body).await,
        Err(e) => error_response(&ServiceError::Input(e.to_string())),
    };

    if state.config.http.verbose {
        dump(&parts, &response);
    }
    response
}

async fn run_handler<H: ServiceHandler>(
    state: &AppState,
    handler: &H,
    parts: &Parts,
    body: Bytes,
) -> Response {
    let mut ctx = match RequestContext::new(
        parts,
        body,
        handler.mount(),
        &state.defaults,
        state.sessions.clone(),
    ) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(&ServiceError::Auth(e)),
    };

    if let Err(err) = handler.run(&mut ctx).await {
        report(ctx.id(), &err);
        ctx.send_error(err.status(), &err.message());
    }
    ctx.close().await;
    ctx.into_response()
}

fn report(request_id: &str, err: &ServiceError) {
    match err.kind() {
        ErrorKind::Unexpected => {
            tracing::error!(request_id, error = %err, "Potential bug: unexpected service error")
        }
        kind => tracing::debug!(request_id, ?kind, status = %err.status(), error = %err, "Request failed"),
    }
}

fn error_response(err: &ServiceError) -> Response {
    report("-", err);
    ResponseParts::error(err.status(), &err.message()).into_response()
}

fn dump(request: &Parts, response: &Response) {
    tracing::info!(
        method = %request.method,
        uri = %request.uri,
        headers = ?request.headers,
        "_ REQUEST"
    );
    tracing::info!(
        status = %response.status(),
        headers = ?response.headers(),
        "_ RESPONSE"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::protocol::ProtocolError;

    #[test]
    fn status_table() {
        assert_eq!(
            ServiceError::http(StatusCode::NOT_FOUND, "gone").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Auth(AuthError::MalformedCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ServiceError::Input("bad".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::Evaluation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Unexpected("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages() {
        assert_eq!(ServiceError::http(StatusCode::CONFLICT, "exists").message(), "exists");
        assert_eq!(ServiceError::Evaluation("Stopped at 1".into()).message(), "Stopped at 1");
        assert_eq!(
            ServiceError::Unexpected("secret detail".into()).message(),
            UNEXPECTED_MESSAGE
        );
    }

    #[test]
    fn session_errors_map_to_kinds() {
        let cases = [
            (SessionError::AccessDenied("admin".into()), ErrorKind::Authentication),
            (SessionError::Evaluation("x".into()), ErrorKind::Evaluation),
            (SessionError::NotFound("x".into()), ErrorKind::Protocol),
            (SessionError::Protocol(ProtocolError::Closed), ErrorKind::Input),
            (SessionError::Unavailable("x".into()), ErrorKind::Unexpected),
        ];
        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind(), kind);
        }
    }
}
