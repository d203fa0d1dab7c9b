//! Database subsystem.
//!
//! The storage and query engine itself lives behind the [`Database`] trait.
//! This crate ships a small in-memory engine, the client/server wire
//! protocol and the co-located database server that exposes an engine on
//! the server port.
//!
//! # Data Flow
//! ```text
//! LocalSession ──────────────────────────────┐
//!                                            ▼
//! RemoteSession → protocol.rs → server.rs → Database (memory.rs)
//! ```

pub mod memory;
pub mod protocol;
pub mod server;

use thiserror::Error;

pub use memory::MemoryDatabase;
pub use server::DatabaseServer;

/// Identifier of an open database session.
pub type SessionId = u64;

/// Errors raised by a database engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// Unknown user or wrong password.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The command or query could not be evaluated.
    #[error("{0}")]
    Evaluation(String),

    /// The addressed database or resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The session id is not (or no longer) registered.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// The database context has been closed.
    #[error("Database context is closed")]
    Closed,
}

/// An embedded database engine.
///
/// Sessions are opened with credentials, identified by id afterwards and
/// must be closed exactly once by their owner.
pub trait Database: Send + Sync + 'static {
    /// Authenticate with a plain password and open a session.
    fn open_session(&self, user: &str, password: &str) -> Result<SessionId, DatabaseError>;

    /// Authenticate with a challenge digest (see [`protocol::login_digest`]) and open a session.
    fn open_session_digest(
        &self,
        user: &str,
        nonce: &str,
        digest: &str,
    ) -> Result<SessionId, DatabaseError>;

    /// Execute a command within a session.
    fn execute(&self, session: SessionId, command: &str) -> Result<String, DatabaseError>;

    /// Close a session. Closing an unknown session is a no-op.
    fn close_session(&self, session: SessionId);

    /// Close the database context, releasing all resources.
    fn close(&self);
}
