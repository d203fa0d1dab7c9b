//! Separate-process start.
//!
//! # Responsibilities
//! - Probe the HTTP port to learn whether a listener is present
//! - Spawn the service as a detached child process
//! - Poll until the child answers or the attempts run out
//!
//! # Design Decisions
//! - Any HTTP response, including a 404, means "running"; only a failed
//!   request means "not running"
//! - Spawning goes through [`Launcher`] so callers can substitute it

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use crate::config::{validate_ports, ServiceConfig};
use crate::lifecycle::supervisor::SupervisorError;

/// Number of liveness probes after spawning.
pub const PROBE_ATTEMPTS: u32 = 10;

/// Pause before each liveness probe.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for a single probe.
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Flag marking the spawned child, which must serve in the foreground.
pub const DAEMON_FLAG: &str = "-D";

/// Whether an HTTP listener answers on `host:port`.
pub async fn ping(host: &str, port: u16) -> bool {
    let client = match reqwest::Client::builder()
        .no_proxy()
        .timeout(PING_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build probe client");
            return false;
        }
    };

    match client.get(format!("http://{host}:{port}/")).send().await {
        Ok(response) => {
            tracing::debug!(host, port, status = %response.status(), "Listener answered");
            true
        }
        Err(e) => {
            tracing::debug!(host, port, error = %e, "No listener");
            false
        }
    }
}

/// Starts a copy of the service with the given arguments.
pub trait Launcher: Send + Sync {
    fn launch(&self, args: &[String]) -> std::io::Result<()>;
}

/// Launches `program` as a detached child with null stdio.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// A launcher for the running executable.
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, args: &[String]) -> std::io::Result<()> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group: terminal signals sent to the parent's group do not reach the service.
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "Service process spawned");
        Ok(())
    }
}

/// Start the service in a separate process.
///
/// `args` are the arguments of the current invocation; the child receives
/// them followed by [`DAEMON_FLAG`].
pub async fn start_service(
    config: &ServiceConfig,
    args: &[String],
    launcher: &dyn Launcher,
) -> Result<(), SupervisorError> {
    validate_ports(&config.ports)?;

    let host = config.connect_host();
    let port = config.ports.http;
    if ping(host, port).await {
        return Err(SupervisorError::AlreadyRunning(port));
    }

    let mut child_args = args.to_vec();
    child_args.push(DAEMON_FLAG.to_string());
    launcher.launch(&child_args).map_err(SupervisorError::Spawn)?;

    for attempt in 1..=PROBE_ATTEMPTS {
        tokio::time::sleep(PROBE_INTERVAL).await;
        if ping(host, port).await {
            tracing::info!(port, attempt, "HTTP server was started");
            return Ok(());
        }
    }

    Err(SupervisorError::StartupTimeout {
        port,
        attempts: PROBE_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn not_found_counts_as_running() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        assert!(ping("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn closed_port_is_not_running() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!ping("127.0.0.1", port).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn launched_process_leads_its_own_group() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("ids");
        let script = format!(
            "echo $$ $(cut -d' ' -f5 /proc/$$/stat) > {}.tmp && mv {0}.tmp {0}",
            out.display()
        );

        ProcessLauncher::new("/bin/sh")
            .launch(&["-c".to_string(), script])
            .unwrap();

        let mut ids = String::new();
        for _ in 0..50 {
            if let Ok(written) = tokio::fs::read_to_string(&out).await {
                ids = written;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let ids: Vec<&str> = ids.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "child did not report its ids");
        assert_eq!(ids[0], ids[1]);
    }
}
