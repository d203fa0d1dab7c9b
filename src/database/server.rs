//! Co-located database server.
//!
//! # Responsibilities
//! - Expose a [`Database`] on the server port via the wire protocol
//! - Stop when woken with a stop marker for its port (same handshake as the HTTP stop port)
//! - Drain open client connections before reporting that it stopped

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use crate::config::ServiceConfig;
use crate::database::protocol::{self, ProtocolError, ERROR, EXIT, NOT_FOUND, OK};
use crate::database::{Database, DatabaseError, SessionId};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::lifecycle::stop::StopMarker;
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// How long a stopping server waits for open connections.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Database server bound to the server port.
pub struct DatabaseServer {
    listener: Listener,
    database: Arc<dyn Database>,
    marker: StopMarker,
    tracker: ConnectionTracker,
    port: u16,
}

impl DatabaseServer {
    /// Bind the server port. Once this returns, clients can connect.
    pub async fn bind(
        config: &ServiceConfig,
        database: Arc<dyn Database>,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(
            config.bind_host(),
            config.ports.server,
            config.database.max_connections,
        )
        .await?;
        let port = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                port: config.ports.server,
                source,
            })?
            .port();

        Ok(Self {
            listener,
            database,
            marker: StopMarker::for_port(&config.network.marker_dir, port),
            tracker: ConnectionTracker::new(),
            port,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve clients until a stop marker arrives or `shutdown` fires.
    ///
    /// A stop marker also triggers `shutdown`, so the owner learns that the
    /// server stopped on request.
    pub async fn run(self, shutdown: Shutdown) {
        let Self {
            listener,
            database,
            marker,
            tracker,
            port,
        } = self;
        let connections = Shutdown::new();
        let mut stopped = shutdown.subscribe();

        tracing::info!(port, "Database server was started");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stopped.recv() => break,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(port, error = %e, "Database server accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if marker.take().await {
                tracing::info!(port, %peer, "Database server stop requested");
                shutdown.trigger();
                break;
            }

            let guard = tracker.track();
            let database = Arc::clone(&database);
            let mut closing = connections.subscribe();
            tokio::spawn(async move {
                let _permit = permit;
                match serve_connection(stream, database.as_ref(), &mut closing).await {
                    Ok(()) => tracing::debug!(connection_id = %guard.id(), %peer, "Client disconnected"),
                    Err(e) => {
                        tracing::debug!(connection_id = %guard.id(), %peer, error = %e, "Client connection failed")
                    }
                }
            });
        }

        drop(listener);
        connections.trigger();
        if !tracker.drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                port,
                open = tracker.active_count(),
                "Database server stopped with open connections"
            );
        }
        tracing::info!(port, "Database server was stopped");
    }
}

/// Run the login handshake and the command loop of one client.
async fn serve_connection(
    stream: TcpStream,
    database: &dyn Database,
    closing: &mut ShutdownSignal,
) -> Result<(), ProtocolError> {
    let mut stream = BufStream::new(stream);

    let nonce = rand::random::<u64>().to_string();
    protocol::write_string(&mut stream, &nonce).await?;
    stream.flush().await?;

    let user = protocol::read_string(&mut stream).await?;
    let digest = protocol::read_string(&mut stream).await?;
    let session = match database.open_session_digest(&user, &nonce, &digest) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(user = %user, error = %e, "Login rejected");
            stream.write_u8(ERROR).await?;
            stream.flush().await?;
            return Ok(());
        }
    };
    stream.write_u8(OK).await?;
    stream.flush().await?;

    let result = command_loop(&mut stream, database, session, closing).await;
    database.close_session(session);
    result
}

async fn command_loop(
    stream: &mut BufStream<TcpStream>,
    database: &dyn Database,
    session: SessionId,
    closing: &mut ShutdownSignal,
) -> Result<(), ProtocolError> {
    loop {
        let command = tokio::select! {
            command = protocol::read_string(stream) => command,
            _ = closing.recv() => return Ok(()),
        };
        let command = command?;
        if command == EXIT {
            return Ok(());
        }

        match database.execute(session, &command) {
            Ok(result) => {
                protocol::write_string(stream, &result).await?;
                protocol::write_string(stream, "").await?;
                stream.write_u8(OK).await?;
            }
            Err(e) => {
                protocol::write_string(stream, "").await?;
                protocol::write_string(stream, &e.to_string()).await?;
                stream.write_u8(failure_status(&e)).await?;
            }
        }
        stream.flush().await?;
    }
}

/// Status byte a failed command is answered with.
fn failure_status(err: &DatabaseError) -> u8 {
    match err {
        DatabaseError::NotFound(_) => NOT_FOUND,
        _ => ERROR,
    }
}
