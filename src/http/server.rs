//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the enabled services
//! - Serve static files from the HTTP root, resolving directories to a welcome file
//! - Wire up middleware (tracing, timeout, request id, panic recovery)
//! - Serve until the shutdown signal fires

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::auth::Credentials;
use crate::http::dispatch::{dispatch, ServiceHandler, UNEXPECTED_MESSAGE};
use crate::http::response::ResponseParts;
use crate::http::services::{RestService, UnsupportedService};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::{bind_reusable, ListenerError};
use crate::session::SessionFactory;

/// Files served for a directory request, in order of preference.
pub const WELCOME_FILES: [&str; 3] = ["index.xml", "index.xhtml", "index.html"];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub sessions: Arc<SessionFactory>,
    /// Credentials used when a request carries no `Authorization` header.
    pub defaults: Credentials,
}

/// HTTP front-end of the database.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: Arc<ServiceConfig>, sessions: Arc<SessionFactory>) -> Self {
        let state = AppState {
            defaults: Credentials::from(&config.credentials),
            config,
            sessions,
        };
        Self {
            router: build_router(state),
        }
    }

    /// The router, for serving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind the HTTP port.
    pub async fn bind(config: &ServiceConfig) -> Result<TcpListener, ListenerError> {
        bind_reusable(config.bind_host(), config.ports.http).await
    }

    /// Serve on `listener` until `shutdown` fires; in-flight requests complete.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server was started");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::debug!(address = %addr, "HTTP listener closed");
        Ok(())
    }
}

/// Build the router with all middleware layers.
#[allow(deprecated)]
fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let mut router = Router::new();

    if config.services.rest {
        router = mount(router, RestService);
    }
    if config.services.webdav {
        router = mount(router, UnsupportedService::webdav());
    }
    if config.services.restxq {
        router = mount(router, UnsupportedService::restxq());
    }

    router
        .fallback(static_files)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.http.request_timeout_secs,
        )))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Route `handler.mount()` and everything below it through the dispatcher.
fn mount<H: ServiceHandler>(router: Router<AppState>, handler: H) -> Router<AppState> {
    let handler = Arc::new(handler);
    let prefix = handler.mount();
    let service = move |State(state): State<AppState>, request: Request<Body>| {
        let handler = Arc::clone(&handler);
        async move { dispatch(&state, handler.as_ref(), request).await }
    };

    router
        .route(prefix, any(service.clone()))
        .route(&format!("{prefix}/{{*path}}"), any(service))
}

/// Serve a file below the HTTP root.
async fn static_files(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let root = &state.config.http.static_path;
    if let Some(uri) = welcome_uri(root, request.uri()).await {
        *request.uri_mut() = uri;
    }

    let files = ServeDir::new(root).not_found_service(not_found.into_service());
    match files.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Rewrite a request for a directory (`.../`) to its first existing welcome file.
///
/// Directory requests without the trailing slash are left to [`ServeDir`],
/// which redirects them.
async fn welcome_uri(root: &Path, uri: &Uri) -> Option<Uri> {
    let path = uri.path();
    if !path.ends_with('/') {
        return None;
    }
    let relative = percent_decode_str(path).decode_utf8().ok()?;
    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }

    let dir = root.join(relative.trim_start_matches('/'));
    for name in WELCOME_FILES {
        if tokio::fs::metadata(dir.join(name))
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            let rewritten = match uri.query() {
                Some(query) => format!("{path}{name}?{query}"),
                None => format!("{path}{name}"),
            };
            return rewritten.parse().ok();
        }
    }
    None
}

async fn not_found() -> Response {
    ResponseParts::error(StatusCode::NOT_FOUND, "Not found").into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "Potential bug: handler panicked");
    ResponseParts::error(StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_MESSAGE).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use axum::http::header;

    fn server(configure: impl FnOnce(&mut ServiceConfig)) -> (HttpServer, Arc<MemoryDatabase>) {
        let mut config = ServiceConfig::default();
        configure(&mut config);
        let database = Arc::new(MemoryDatabase::new(&config.database.users));
        let sessions = Arc::new(SessionFactory::new(&config, database.clone()));
        (HttpServer::new(Arc::new(config), sessions), database)
    }

    async fn send(router: Router, request: axum::http::Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn disabled_services_are_not_routed() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) = server(|c| {
            c.services.webdav = false;
            c.http.static_path = dir.path().to_path_buf();
        });

        let (status, _, _) = send(
            server.router(),
            axum::http::Request::get("/webdav/db").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, body) = send(
            server.router(),
            axum::http::Request::get("/restxq").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body, "RESTXQ is not available.");
    }

    #[tokio::test]
    async fn serves_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        let (server, _) = server(|c| c.http.static_path = dir.path().to_path_buf());

        let (status, _, body) = send(
            server.router(),
            axum::http::Request::get("/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>hi</h1>");

        let (status, headers, body) = send(
            server.router(),
            axum::http::Request::get("/missing.txt").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=UTF-8");
        assert_eq!(body, "Not found");
    }

    #[tokio::test]
    async fn directories_resolve_welcome_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "html").unwrap();
        std::fs::write(dir.path().join("index.xml"), "<xml/>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "html").unwrap();
        std::fs::write(dir.path().join("docs/index.xhtml"), "<xhtml/>").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let (server, _) = server(|c| c.http.static_path = dir.path().to_path_buf());

        let (status, _, body) = send(
            server.router(),
            axum::http::Request::get("/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<xml/>");

        let (status, _, body) = send(
            server.router(),
            axum::http::Request::get("/docs/?v=1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<xhtml/>");

        let (status, _, body) = send(
            server.router(),
            axum::http::Request::get("/empty/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (server, _) = server(|_| {});
        let (_, headers, _) = send(
            server.router(),
            axum::http::Request::get("/rest").body(Body::empty()).unwrap(),
        )
        .await;
        assert!(headers.contains_key("x-request-id"));
    }
}
