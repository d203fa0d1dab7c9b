//! Networked session against a separate database server.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use crate::database::protocol::{self, ProtocolError, EXIT, NOT_FOUND, OK};
use crate::session::SessionError;

/// Upper bound for establishing the connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A session speaking the wire protocol to a database server.
///
/// Dropping it without [`RemoteSession::close`] closes the socket; the
/// server releases the session when it sees the connection end.
pub struct RemoteSession {
    stream: BufStream<TcpStream>,
    user: String,
}

impl RemoteSession {
    /// Connect to `host:port` and log in.
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Result<Self, SessionError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("Connection to {host}:{port} timed out"),
                ))
            })?
            .map_err(ProtocolError::Io)?;
        let mut stream = BufStream::new(stream);

        let nonce = protocol::read_string(&mut stream).await?;
        protocol::write_string(&mut stream, user).await?;
        protocol::write_string(&mut stream, &protocol::login_digest(password, &nonce)).await?;
        stream.flush().await.map_err(ProtocolError::Io)?;

        if protocol::read_byte(&mut stream).await? != OK {
            return Err(SessionError::AccessDenied(user.to_string()));
        }

        tracing::debug!(host, port, user, "Remote session opened");
        Ok(Self {
            stream,
            user: user.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        protocol::write_string(&mut self.stream, command).await?;
        self.stream.flush().await.map_err(ProtocolError::Io)?;

        let result = protocol::read_string(&mut self.stream).await?;
        let info = protocol::read_string(&mut self.stream).await?;
        match protocol::read_byte(&mut self.stream).await? {
            OK => Ok(result),
            NOT_FOUND => Err(SessionError::NotFound(info)),
            _ => Err(SessionError::Evaluation(info)),
        }
    }

    pub async fn close(mut self) -> Result<(), SessionError> {
        protocol::write_string(&mut self.stream, EXIT).await?;
        self.stream.flush().await.map_err(ProtocolError::Io)?;
        self.stream.shutdown().await.map_err(ProtocolError::Io)?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("user", &self.user)
            .field("peer", &self.stream.get_ref().peer_addr().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::database::{DatabaseServer, MemoryDatabase};
    use crate::lifecycle::Shutdown;
    use std::sync::Arc;

    async fn server() -> (u16, Arc<MemoryDatabase>, Shutdown) {
        let mut config = ServiceConfig::default();
        config.network.host = "127.0.0.1".into();
        config.ports.server = 0;
        let database = Arc::new(MemoryDatabase::new(&config.database.users));
        let server = DatabaseServer::bind(&config, database.clone()).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let shutdown = Shutdown::new();
        tokio::spawn(server.run(shutdown.clone()));
        (port, database, shutdown)
    }

    #[tokio::test]
    async fn executes_and_closes() {
        let (port, database, shutdown) = server().await;

        let mut session = RemoteSession::connect("127.0.0.1", port, "admin", "admin")
            .await
            .unwrap();
        assert_eq!(session.user(), "admin");
        session.execute("PUT db/a.xml\n<a/>").await.unwrap();
        assert_eq!(session.execute("GET db/a.xml").await.unwrap(), "<a/>");

        let err = session.execute("GET db/b.xml").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(msg) if msg == "Resource \"db/b.xml\" was not found."));

        let err = session.execute("GET none/b.xml").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(msg) if msg == "Database 'none' was not found."));

        let err = session.execute("FROB").await.unwrap_err();
        assert!(matches!(err, SessionError::Evaluation(msg) if msg == "Unknown command: FROB"));

        session.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(database.open_sessions(), 0);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn wrong_password_is_access_denied() {
        let (port, _database, shutdown) = server().await;
        let err = RemoteSession::connect("127.0.0.1", port, "admin", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AccessDenied(user) if user == "admin"));
        shutdown.trigger();
    }

    #[tokio::test]
    async fn dropped_session_is_released_by_server() {
        let (port, database, shutdown) = server().await;
        let session = RemoteSession::connect("127.0.0.1", port, "admin", "admin")
            .await
            .unwrap();
        assert_eq!(database.open_sessions(), 1);

        drop(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(database.open_sessions(), 0);
        shutdown.trigger();
    }
}
