//! Database sessions.
//!
//! # Data Flow
//! ```text
//! RequestContext::session()
//!     → SessionFactory::open (mode chosen once at startup)
//!         ├─ Embedded / Local → LocalSession  (direct calls into the Database)
//!         └─ Client           → RemoteSession (wire protocol to the server port)
//! ```
//!
//! # Design Decisions
//! - Sessions are a closed enum, not trait objects: there are exactly two variants
//! - `close` consumes the session, so a session cannot be closed twice
//! - Dropping an unclosed session still releases it (panics, cancelled requests)

pub mod local;
pub mod remote;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ProcessMode, ServiceConfig};
use crate::database::protocol::ProtocolError;
use crate::database::{Database, DatabaseError};

pub use local::LocalSession;
pub use remote::RemoteSession;

/// Errors raised by sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login was rejected.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The database could not evaluate a command.
    #[error("{0}")]
    Evaluation(String),

    /// The addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Talking to a remote server failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The database context is closed or lost track of the session.
    #[error("{0}")]
    Unavailable(String),
}

impl From<DatabaseError> for SessionError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::AccessDenied(user) => SessionError::AccessDenied(user),
            DatabaseError::Evaluation(msg) => SessionError::Evaluation(msg),
            DatabaseError::NotFound(msg) => SessionError::NotFound(msg),
            e @ (DatabaseError::UnknownSession(_) | DatabaseError::Closed) => {
                SessionError::Unavailable(e.to_string())
            }
        }
    }
}

/// An authenticated database session.
#[derive(Debug)]
pub enum Session {
    Local(LocalSession),
    Remote(RemoteSession),
}

impl Session {
    /// Execute a command and return its result.
    pub async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        match self {
            Session::Local(session) => session.execute(command),
            Session::Remote(session) => session.execute(command).await,
        }
    }

    /// Close the session.
    pub async fn close(self) -> Result<(), SessionError> {
        match self {
            Session::Local(session) => {
                session.close();
                Ok(())
            }
            Session::Remote(session) => session.close().await,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Session::Remote(_))
    }
}

/// Creates sessions of the kind selected by the process mode.
#[derive(Clone)]
pub struct SessionFactory {
    mode: ProcessMode,
    database: Arc<dyn Database>,
    host: String,
    port: u16,
}

impl SessionFactory {
    pub fn new(config: &ServiceConfig, database: Arc<dyn Database>) -> Self {
        Self {
            mode: config.mode,
            database,
            host: config.connect_host().to_string(),
            port: config.ports.server,
        }
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    /// Authenticate and open a new session.
    pub async fn open(&self, user: &str, password: &str) -> Result<Session, SessionError> {
        match self.mode {
            ProcessMode::Client => RemoteSession::connect(&self.host, self.port, user, password)
                .await
                .map(Session::Remote),
            ProcessMode::Embedded | ProcessMode::Local => {
                LocalSession::open(Arc::clone(&self.database), user, password).map(Session::Local)
            }
        }
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}
