//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, static files)
//!     → dispatch.rs (one RequestContext per request)
//!         → auth.rs (default or Basic credentials)
//!         → request.rs (segments, query, Accept)
//!     → services.rs (REST, placeholders)
//!         → RequestContext::session() (opened on first use)
//!     → dispatch.rs (error → status, close context)
//!     → response.rs (content type, challenge, body)
//! ```

pub mod auth;
pub mod context;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod services;

pub use auth::{AuthError, Credentials};
pub use context::RequestContext;
pub use dispatch::{dispatch, ErrorKind, ServiceError, ServiceHandler};
pub use server::{AppState, HttpServer};
pub use services::{RestService, UnsupportedService};
