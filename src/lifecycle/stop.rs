//! Cross-process stop handshake.
//!
//! A running instance binds a [`StopListener`] on its stop port. The stop
//! command ([`stop_signal`]) creates a [`StopMarker`] file for that port and
//! opens a throwaway TCP connection to wake the listener. The connection
//! carries no payload; the marker carries the intent, so incidental probes
//! of the stop port are ignored.
//!
//! ```text
//! Listening ──accept──▶ Checking ──marker present──▶ ShuttingDown ──▶ exit
//!     ▲                    │
//!     └───no marker────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::lifecycle::shutdown::Shutdown;
use crate::net::{bind_reusable, ListenerError};

/// Prefix of stop marker file names.
pub const MARKER_PREFIX: &str = "xmldb-http";

/// Time given to the signalled process to act on the stop request.
pub const STOP_GRACE: Duration = Duration::from_millis(100);

/// Errors raised by the stop command.
#[derive(Debug, Error)]
pub enum StopHandshakeError {
    #[error("Could not create stop marker {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not reach stop port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem flag whose presence means "shut down", keyed by port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopMarker {
    path: PathBuf,
}

impl StopMarker {
    /// Marker for `port` inside `dir`.
    pub fn for_port(dir: &Path, port: u16) -> Self {
        Self {
            path: dir.join(format!("{MARKER_PREFIX}{port}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Create the marker. Creating an existing marker succeeds.
    pub async fn create(&self) -> std::io::Result<()> {
        tokio::fs::File::create(&self.path).await.map(drop)
    }

    /// Delete the marker if present.
    pub async fn remove(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete stop marker")
            }
        }
    }

    /// Consume the marker: returns `true` and deletes it if it was present.
    pub async fn take(&self) -> bool {
        if self.exists().await {
            self.remove().await;
            true
        } else {
            false
        }
    }
}

/// Signal the instance listening on `host:port` to stop.
///
/// If the stop port cannot be reached the marker is deleted again, so an
/// unreachable port never leaves a stale marker behind. Repeated calls are safe.
pub async fn stop_signal(host: &str, port: u16, marker_dir: &Path) -> Result<(), StopHandshakeError> {
    let marker = StopMarker::for_port(marker_dir, port);
    marker
        .create()
        .await
        .map_err(|source| StopHandshakeError::Marker {
            path: marker.path().to_path_buf(),
            source,
        })?;

    match TcpStream::connect((host, port)).await {
        Ok(stream) => {
            drop(stream);
            tracing::debug!(host, port, "Stop signal delivered");
            tokio::time::sleep(STOP_GRACE).await;
            Ok(())
        }
        Err(source) => {
            marker.remove().await;
            Err(StopHandshakeError::Connect { port, source })
        }
    }
}

/// Acceptor on the stop port that stops the HTTP listener on request.
pub struct StopListener {
    listener: TcpListener,
    marker: StopMarker,
    port: u16,
}

impl StopListener {
    /// Bind the stop port, optionally restricted to `host`.
    pub async fn bind(
        host: Option<&str>,
        port: u16,
        marker_dir: &Path,
    ) -> Result<Self, ListenerError> {
        let listener = bind_reusable(host, port).await?;
        Ok(Self {
            listener,
            marker: StopMarker::for_port(marker_dir, port),
            port,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept wake-up connections until a marker is found, then trigger
    /// `http_shutdown` and return. Also returns when `http_shutdown` fires
    /// for another reason.
    pub async fn run(self, http_shutdown: Shutdown) {
        let Self {
            listener,
            marker,
            port,
        } = self;
        let mut stopped = http_shutdown.subscribe();
        tracing::debug!(port, "Stop listener waiting");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stopped.recv() => {
                    tracing::debug!(port, "Stop listener exiting");
                    return;
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    drop(stream);
                    if marker.exists().await {
                        tracing::info!(port, %peer, "Stop requested");
                        drop(listener);
                        marker.remove().await;
                        http_shutdown.trigger();
                        return;
                    }
                    tracing::debug!(port, %peer, "Ignoring connection without stop marker");
                }
                Err(e) => {
                    tracing::warn!(port, error = %e, "Stop listener accept failed");
                    tokio::time::sleep(STOP_GRACE).await;
                }
            }
        }
    }
}
