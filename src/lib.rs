//! HTTP front-end of an embedded XML database.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!   stop command ─────┼─▶ lifecycle::stop ──marker + wake-up──┐       │
//!                     │                                       ▼       │
//!   HTTP request ─────┼─▶ http::server ─▶ http::dispatch ─▶ services  │
//!                     │                    │ RequestContext   │       │
//!                     │                    ▼                  ▼       │
//!                     │               http::auth        session::*    │
//!                     │                                  │       │    │
//!                     │                          local calls   wire   │
//!                     │                                  ▼       ▼    │
//!   client sessions ──┼─▶ database::server ─────▶ database::Database  │
//!                     └───────────────────────────────────────────────┘
//! ```
//!
//! `lifecycle::supervisor` starts the pieces in order: ports are validated,
//! the database server is bound, then the HTTP listener and the stop listener.

pub mod cli;
pub mod config;
pub mod database;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod session;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, Supervisor};
