//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use xmldb_http::config::ServiceConfig;
use xmldb_http::lifecycle::Launcher;

/// Start a mock HTTP responder that answers every request with `status_line`.
///
/// Returns the port it listens on.
pub async fn start_mock_responder(status_line: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Config on the loopback interface with ports `base..base + 4` and
/// private marker and static directories.
pub fn test_config(base: u16) -> (ServiceConfig, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::default();
    config.ports.server = base;
    config.ports.event = base + 1;
    config.ports.http = base + 2;
    config.ports.stop = base + 3;
    config.network.host = "127.0.0.1".into();
    config.network.marker_dir = dir.path().to_path_buf();
    config.http.static_path = dir.path().to_path_buf();
    config.credentials.user = Some("admin".into());
    config.credentials.password = Some("admin".into());
    (config, dir)
}

/// Launcher that records launches instead of spawning processes.
#[derive(Default)]
pub struct CountingLauncher {
    launches: AtomicUsize,
    last_args: Mutex<Vec<String>>,
}

impl CountingLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Vec<String> {
        self.last_args.lock().unwrap().clone()
    }
}

impl Launcher for CountingLauncher {
    fn launch(&self, args: &[String]) -> std::io::Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = args.to_vec();
        Ok(())
    }
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
