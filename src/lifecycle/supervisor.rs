//! Service supervisor.
//!
//! # Responsibilities
//! - Validate ports before anything binds
//! - Start the co-located database server before the HTTP listener
//! - Bind the HTTP listener and the stop listener
//! - Release the database context when the service ends
//! - Deliver stop requests to a running instance
//!
//! # Design Decisions
//! - Ordered startup: ports, database server, HTTP listener, stop listener
//! - A failed startup step stops whatever was already started
//! - Stop signals the database server first, then the HTTP listener;
//!   both are always attempted and failures are reported per component

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{validate_ports, ServiceConfig, ValidationError};
use crate::database::{Database, DatabaseServer};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::stop::{stop_signal, StopHandshakeError, StopListener};
use crate::net::ListenerError;
use crate::session::SessionFactory;

/// Errors raised while starting, running or stopping the service.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error("HTTP server is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("HTTP server on port {port} did not answer after {attempts} attempts")]
    StartupTimeout { port: u16, attempts: u32 },

    #[error("Could not start service process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Stop(#[from] StopFailure),
}

/// Outcome of a stop request that failed for at least one component.
#[derive(Debug)]
pub struct StopFailure {
    /// Failure to signal the database server, if one was signalled.
    pub database: Option<StopHandshakeError>,
    /// Failure to signal the HTTP listener.
    pub http: Option<StopHandshakeError>,
}

impl std::fmt::Display for StopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(e) = &self.database {
            parts.push(format!("database server: {e}"));
        }
        if let Some(e) = &self.http {
            parts.push(format!("HTTP server: {e}"));
        }
        write!(f, "Stop failed ({})", parts.join("; "))
    }
}

impl std::error::Error for StopFailure {}

/// Starts the service in this process.
pub struct Supervisor {
    config: Arc<ServiceConfig>,
    database: Arc<dyn Database>,
}

impl Supervisor {
    pub fn new(config: Arc<ServiceConfig>, database: Arc<dyn Database>) -> Self {
        Self { config, database }
    }

    /// Start every component. Once this returns, all listeners accept connections.
    pub async fn start(&self) -> Result<RunningService, SupervisorError> {
        let config = &self.config;
        validate_ports(&config.ports)?;

        let database_server = if config.runs_database_server() {
            let server = DatabaseServer::bind(config, Arc::clone(&self.database)).await?;
            let addr = server.local_addr().ok();
            let shutdown = Shutdown::new();
            let task = tokio::spawn(server.run(shutdown.clone()));
            Some(DatabaseServerHandle {
                addr,
                shutdown,
                task,
            })
        } else {
            None
        };

        let bound = async {
            let http = HttpServer::bind(config).await?;
            let http_addr = http.local_addr().map_err(|source| ListenerError::Bind {
                port: config.ports.http,
                source,
            })?;
            let stop = StopListener::bind(
                config.bind_host(),
                config.ports.stop,
                &config.network.marker_dir,
            )
            .await?;
            let stop_addr = stop.local_addr().map_err(|source| ListenerError::Bind {
                port: config.ports.stop,
                source,
            })?;
            Ok::<_, ListenerError>((http, http_addr, stop, stop_addr))
        }
        .await;
        let (listener, http_addr, stop_listener, stop_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                if let Some(server) = database_server {
                    server.stop().await;
                }
                return Err(e.into());
            }
        };

        let sessions = Arc::new(SessionFactory::new(config, Arc::clone(&self.database)));
        let server = HttpServer::new(Arc::clone(config), sessions);
        let http_shutdown = Shutdown::new();
        let http_task = tokio::spawn(server.run(listener, http_shutdown.subscribe()));
        let stop_task = tokio::spawn(stop_listener.run(http_shutdown.clone()));

        tracing::info!(
            mode = %config.mode,
            http = %http_addr,
            stop = %stop_addr,
            database = ?database_server.as_ref().and_then(|s| s.addr),
            "Service started"
        );

        Ok(RunningService {
            http_addr,
            stop_addr,
            http_shutdown,
            http_task,
            stop_task,
            database_server,
            _guard: ExitGuard {
                database: Arc::clone(&self.database),
            },
        })
    }
}

struct DatabaseServerHandle {
    addr: Option<SocketAddr>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl DatabaseServerHandle {
    /// Stop the server and wait until it released its port.
    async fn stop(self) {
        self.shutdown.trigger();
        if self.task.await.is_err() {
            tracing::warn!("Database server task ended abnormally");
        }
    }
}

/// Releases the database context when the service ends, including on unwind.
struct ExitGuard {
    database: Arc<dyn Database>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.database.close();
        tracing::info!("HTTP server was stopped");
    }
}

/// Handle for stopping a running service from another task.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    http: Shutdown,
    database: Option<Shutdown>,
}

impl ServiceHandle {
    /// Stop the database server and the HTTP listener.
    pub fn stop(&self) {
        if let Some(database) = &self.database {
            database.trigger();
        }
        self.http.trigger();
    }
}

/// A started service.
pub struct RunningService {
    http_addr: SocketAddr,
    stop_addr: SocketAddr,
    http_shutdown: Shutdown,
    http_task: JoinHandle<std::io::Result<()>>,
    stop_task: JoinHandle<()>,
    database_server: Option<DatabaseServerHandle>,
    _guard: ExitGuard,
}

impl RunningService {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn stop_addr(&self) -> SocketAddr {
        self.stop_addr
    }

    /// Address of the co-located database server, if one runs.
    pub fn database_addr(&self) -> Option<SocketAddr> {
        self.database_server.as_ref().and_then(|s| s.addr)
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            http: self.http_shutdown.clone(),
            database: self.database_server.as_ref().map(|s| s.shutdown.clone()),
        }
    }

    /// Wait until the HTTP listener and the database server have stopped.
    ///
    /// Each stops on its own stop request, or both on [`ServiceHandle::stop`].
    pub async fn wait(self) -> Result<(), SupervisorError> {
        let Self {
            http_shutdown,
            http_task,
            stop_task,
            database_server,
            _guard: guard,
            ..
        } = self;

        let served = match http_task.await {
            Ok(result) => result.map_err(SupervisorError::Serve),
            Err(e) => Err(SupervisorError::Serve(std::io::Error::other(e))),
        };
        http_shutdown.trigger();
        let _ = stop_task.await;

        if let Some(server) = database_server {
            if server.task.await.is_err() {
                tracing::warn!("Database server task ended abnormally");
            }
        }

        drop(guard);
        served
    }
}

/// Ask a running instance to stop.
pub async fn stop_instance(config: &ServiceConfig) -> Result<(), SupervisorError> {
    let host = config.connect_host();
    let dir = &config.network.marker_dir;

    let database = if config.runs_database_server() {
        stop_signal(host, config.ports.server, dir).await.err()
    } else {
        None
    };
    let http = stop_signal(host, config.ports.stop, dir).await.err();

    if database.is_none() && http.is_none() {
        tracing::info!(port = config.ports.http, "HTTP server was stopped");
        Ok(())
    } else {
        Err(StopFailure { database, http }.into())
    }
}
