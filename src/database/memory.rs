//! In-memory database engine.
//!
//! Keeps named databases of text resources and understands a small command
//! language:
//!
//! ```text
//! LIST                      names of all databases
//! LIST <db>                 resource paths of a database
//! GET <db>/<path>           resource content
//! PUT <db>/<path>\n<text>   store a resource, creating the database on demand
//! DELETE <db>/<path>        remove a resource
//! DROP <db>                 remove a database
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::UserConfig;
use crate::database::protocol::login_digest;
use crate::database::{Database, DatabaseError, SessionId};

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List(Option<String>),
    Get { db: String, path: String },
    Put { db: String, path: String, content: String },
    Delete { db: String, path: String },
    Drop(String),
}

impl Command {
    fn parse(input: &str) -> Result<Self, DatabaseError> {
        let input = input.trim_start();
        let (keyword, rest) = match input.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim_start()),
            None => (input, ""),
        };

        match keyword.to_ascii_uppercase().as_str() {
            "LIST" => {
                let db = rest.trim();
                Ok(Command::List((!db.is_empty()).then(|| db.to_string())))
            }
            "GET" => {
                let (db, path) = resource(rest.trim())?;
                Ok(Command::Get { db, path })
            }
            "PUT" => {
                let (target, content) = rest.split_once('\n').unwrap_or((rest, ""));
                let (db, path) = resource(target.trim())?;
                Ok(Command::Put {
                    db,
                    path,
                    content: content.to_string(),
                })
            }
            "DELETE" => {
                let (db, path) = resource(rest.trim())?;
                Ok(Command::Delete { db, path })
            }
            "DROP" => match rest.trim() {
                "" => Err(DatabaseError::Evaluation("Database name expected.".into())),
                db => Ok(Command::Drop(db.to_string())),
            },
            "" => Err(DatabaseError::Evaluation("No command specified.".into())),
            other => Err(DatabaseError::Evaluation(format!("Unknown command: {other}"))),
        }
    }
}

/// Split `db/path` into its two parts; both must be non-empty.
fn resource(target: &str) -> Result<(String, String), DatabaseError> {
    match target.split_once('/') {
        Some((db, path)) if !db.is_empty() && !path.is_empty() => {
            Ok((db.to_string(), path.trim_matches('/').to_string()))
        }
        _ => Err(DatabaseError::Evaluation(format!(
            "Resource path expected: \"{target}\""
        ))),
    }
}

/// A thread-safe in-memory database.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: HashMap<String, String>,
    sessions: DashMap<SessionId, String>,
    databases: DashMap<String, BTreeMap<String, String>>,
    next_session: AtomicU64,
    sessions_opened: AtomicU64,
    closed: AtomicBool,
}

impl MemoryDatabase {
    /// Create an empty database that accepts the given users.
    pub fn new(users: &[UserConfig]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.name.clone(), u.password.clone()))
                .collect(),
            next_session: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions opened since creation.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Whether [`Database::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn register(&self, user: &str) -> Result<SessionId, DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::Closed);
        }
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(id, user.to_string());
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session = id, user, "Session opened");
        Ok(id)
    }

    fn run(&self, command: Command) -> Result<String, DatabaseError> {
        match command {
            Command::List(None) => {
                let mut names: Vec<String> =
                    self.databases.iter().map(|db| db.key().clone()).collect();
                names.sort();
                Ok(names.join("\n"))
            }
            Command::List(Some(db)) => {
                let resources = self.databases.get(&db).ok_or_else(|| missing_db(&db))?;
                Ok(resources.keys().cloned().collect::<Vec<_>>().join("\n"))
            }
            Command::Get { db, path } => self
                .databases
                .get(&db)
                .ok_or_else(|| missing_db(&db))?
                .get(&path)
                .cloned()
                .ok_or_else(|| missing_resource(&db, &path)),
            Command::Put { db, path, content } => {
                let mut resources = self.databases.entry(db.clone()).or_default();
                let replaced = resources.insert(path.clone(), content).is_some();
                Ok(if replaced {
                    format!("Resource \"{db}/{path}\" replaced.")
                } else {
                    format!("Resource \"{db}/{path}\" added.")
                })
            }
            Command::Delete { db, path } => {
                let mut resources = self.databases.get_mut(&db).ok_or_else(|| missing_db(&db))?;
                resources
                    .remove(&path)
                    .map(|_| format!("Resource \"{db}/{path}\" deleted."))
                    .ok_or_else(|| missing_resource(&db, &path))
            }
            Command::Drop(db) => self
                .databases
                .remove(&db)
                .map(|_| format!("Database '{db}' was dropped."))
                .ok_or_else(|| missing_db(&db)),
        }
    }
}

fn missing_db(db: &str) -> DatabaseError {
    DatabaseError::NotFound(format!("Database '{db}' was not found."))
}

fn missing_resource(db: &str, path: &str) -> DatabaseError {
    DatabaseError::NotFound(format!("Resource \"{db}/{path}\" was not found."))
}

impl Database for MemoryDatabase {
    fn open_session(&self, user: &str, password: &str) -> Result<SessionId, DatabaseError> {
        match self.users.get(user) {
            Some(expected) if expected == password => self.register(user),
            _ => Err(DatabaseError::AccessDenied(user.to_string())),
        }
    }

    fn open_session_digest(
        &self,
        user: &str,
        nonce: &str,
        digest: &str,
    ) -> Result<SessionId, DatabaseError> {
        match self.users.get(user) {
            Some(password) if login_digest(password, nonce) == digest => self.register(user),
            _ => Err(DatabaseError::AccessDenied(user.to_string())),
        }
    }

    fn execute(&self, session: SessionId, command: &str) -> Result<String, DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::Closed);
        }
        if !self.sessions.contains_key(&session) {
            return Err(DatabaseError::UnknownSession(session));
        }
        self.run(Command::parse(command)?)
    }

    fn close_session(&self, session: SessionId) {
        if self.sessions.remove(&session).is_some() {
            tracing::debug!(session, "Session closed");
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let open = self.sessions.len();
            self.sessions.clear();
            tracing::info!(open_sessions = open, "Database context closed");
        }
    }
}
