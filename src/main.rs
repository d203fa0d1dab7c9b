//! `xmldb-http` binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use xmldb_http::cli::{self, Cli, Command};
use xmldb_http::config::{finalize, load_config, ConfigError, ServiceConfig};
use xmldb_http::database::MemoryDatabase;
use xmldb_http::lifecycle::{self, signals, ProcessLauncher, Supervisor};
use xmldb_http::observability::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load(&cli);
    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => {
            let mut config = ServiceConfig::default();
            cli.apply(&mut config);
            config.logging
        }
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = match loaded {
        Ok(config) => run(&cli, config).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "xmldb-http failed");
            ExitCode::FAILURE
        }
    }
}

/// Configuration file (if any), then flags, then validation.
fn load(cli: &Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    cli.apply(&mut config);
    finalize(config)
}

async fn run(cli: &Cli, mut config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command() {
        Command::Stop => lifecycle::stop_instance(&config).await?,
        Command::Service => {
            let args: Vec<String> = std::env::args().skip(1).collect();
            let launcher = ProcessLauncher::current()?;
            lifecycle::start_service(&config, &args, &launcher).await?;
        }
        Command::Run => {
            if config.credentials.user.is_some() && config.credentials.password.is_none() {
                config.credentials.password = Some(cli::prompt_password()?);
            }

            let config = Arc::new(config);
            let database = Arc::new(MemoryDatabase::new(&config.database.users));
            let running = Supervisor::new(config, database).start().await?;

            let handle = running.handle();
            tokio::spawn(async move {
                signals::wait_for_signal().await;
                handle.stop();
            });

            running.wait().await?;
        }
    }
    Ok(())
}
