//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the HTTP
//! front-end. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the HTTP service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ports of the database server, event channel, HTTP listener and stop listener.
    pub ports: PortConfig,

    /// Host and filesystem settings shared by all listeners.
    pub network: NetworkConfig,

    /// Process mode (embedded server, local or client sessions).
    pub mode: ProcessMode,

    /// Default credentials used when a request carries no `Authorization` header.
    pub credentials: CredentialsConfig,

    /// Which dynamic services get registered.
    pub services: ServicesConfig,

    /// HTTP listener settings.
    pub http: HttpConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// In-process database settings.
    pub database: DatabaseConfig,
}

impl ServiceConfig {
    /// Host used to reach local listeners (pings, stop handshakes, remote sessions).
    pub fn connect_host(&self) -> &str {
        if self.network.host.is_empty() {
            "127.0.0.1"
        } else {
            &self.network.host
        }
    }

    /// Host to bind listeners to; `None` binds all interfaces.
    pub fn bind_host(&self) -> Option<&str> {
        if self.network.host.is_empty() {
            None
        } else {
            Some(&self.network.host)
        }
    }

    /// Whether this process runs the co-located database server.
    pub fn runs_database_server(&self) -> bool {
        self.mode == ProcessMode::Embedded
    }
}

/// The four ports of a running instance. Must be pairwise distinct.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortConfig {
    /// Database server port.
    pub server: u16,

    /// Database event port.
    pub event: u16,

    /// HTTP listener port.
    pub http: u16,

    /// Stop-signal port.
    pub stop: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            server: 1984,
            event: 1985,
            http: 8984,
            stop: 8985,
        }
    }
}

/// Network and filesystem settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host name. Empty binds all interfaces and connects to the loopback address.
    pub host: String,

    /// Directory holding stop markers.
    pub marker_dir: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            marker_dir: std::env::temp_dir(),
        }
    }
}

/// How sessions reach the database.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// Start a co-located database server; sessions are in-process.
    #[default]
    Embedded,
    /// No database server; sessions are in-process.
    Local,
    /// No database server; sessions connect to a separate server process.
    Client,
}

impl std::fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessMode::Embedded => write!(f, "embedded"),
            ProcessMode::Local => write!(f, "local"),
            ProcessMode::Client => write!(f, "client"),
        }
    }
}

/// Process-wide default credentials.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Dynamic service registration switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub rest: bool,
    pub restxq: bool,
    pub webdav: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            rest: true,
            restxq: true,
            webdav: true,
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Root directory for static files.
    pub static_path: PathBuf,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Dump every request and response after it was handled.
    pub verbose: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            static_path: PathBuf::from("http"),
            request_timeout_secs: 30,
            verbose: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Suppress informational output.
    pub quiet: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            quiet: false,
        }
    }
}

/// In-process database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Users known to the in-process database.
    pub users: Vec<UserConfig>,

    /// Maximum concurrent connections to the database server.
    pub max_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            users: vec![UserConfig {
                name: "admin".to_string(),
                password: "admin".to_string(),
            }],
            max_connections: 1_000,
        }
    }
}

/// A database user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
}
