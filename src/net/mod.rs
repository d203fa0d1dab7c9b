//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (database server port)
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to the database wire protocol
//! ```
//!
//! # Design Decisions
//! - Listeners bind with SO_REUSEADDR so a stopped instance can be restarted at once
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so a stopping server can drain

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{bind_reusable, Listener, ListenerError};
