//! In-process session.

use std::sync::Arc;

use crate::database::{Database, SessionId};
use crate::session::SessionError;

/// A session calling straight into the in-process database.
///
/// The database session is released when this value is closed or dropped,
/// whichever happens first.
pub struct LocalSession {
    database: Arc<dyn Database>,
    id: SessionId,
}

impl LocalSession {
    /// Authenticate against `database`.
    pub fn open(
        database: Arc<dyn Database>,
        user: &str,
        password: &str,
    ) -> Result<Self, SessionError> {
        let id = database.open_session(user, password)?;
        Ok(Self { database, id })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        Ok(self.database.execute(self.id, command)?)
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        self.database.close_session(self.id);
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSession").field("id", &self.id).finish()
    }
}
