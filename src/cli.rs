//! Command-line interface.
//!
//! Flags override the configuration file. `-h` is the HTTP port, so help is
//! only available as `--help`.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::config::{ProcessMode, ServiceConfig};

/// HTTP front-end of an embedded XML database.
#[derive(Debug, Parser)]
#[command(name = "xmldb-http", version, disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Start in client mode (sessions connect to a database server)
    #[arg(short = 'c', conflicts_with = "local")]
    pub client: bool,

    /// Start in local mode (no database server)
    #[arg(short = 'l')]
    pub local: bool,

    /// Database server port
    #[arg(short = 'p', value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database event port
    #[arg(short = 'e', value_name = "PORT")]
    pub event_port: Option<u16>,

    /// HTTP port
    #[arg(short = 'h', value_name = "PORT")]
    pub http_port: Option<u16>,

    /// Stop port
    #[arg(short = 's', value_name = "PORT")]
    pub stop_port: Option<u16>,

    /// Host name to bind to and connect to
    #[arg(short = 'n', value_name = "HOST")]
    pub host: Option<String>,

    /// Default user
    #[arg(short = 'U', value_name = "USER")]
    pub user: Option<String>,

    /// Default password
    #[arg(short = 'P', value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Start as a separate service process
    #[arg(short = 'S')]
    pub service: bool,

    /// Suppress informational logging
    #[arg(short = 'z')]
    pub quiet: bool,

    /// Debug logging
    #[arg(short = 'd')]
    pub debug: bool,

    /// Dump every request and response
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Set by the parent of a separate service process
    #[arg(short = 'D', hide = true)]
    pub daemon: bool,

    /// Do not register WebDAV
    #[arg(short = 'W')]
    pub no_webdav: bool,

    /// Do not register REST
    #[arg(short = 'R')]
    pub no_rest: bool,

    /// Do not register RESTXQ
    #[arg(short = 'X')]
    pub no_restxq: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop a running instance
    #[arg(value_enum, ignore_case = true)]
    pub action: Option<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Stop,
}

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve in this process.
    Run,
    /// Start a separate service process and return.
    Service,
    /// Stop a running instance.
    Stop,
}

impl Cli {
    pub fn command(&self) -> Command {
        match self.action {
            Some(Action::Stop) => Command::Stop,
            None if self.service && !self.daemon => Command::Service,
            None => Command::Run,
        }
    }

    /// Apply the flags to `config`.
    pub fn apply(&self, config: &mut ServiceConfig) {
        if self.client {
            config.mode = ProcessMode::Client;
        } else if self.local {
            config.mode = ProcessMode::Local;
        }

        if let Some(port) = self.server_port {
            config.ports.server = port;
        }
        if let Some(port) = self.event_port {
            config.ports.event = port;
        }
        if let Some(port) = self.http_port {
            config.ports.http = port;
        }
        if let Some(port) = self.stop_port {
            config.ports.stop = port;
        }
        if let Some(host) = &self.host {
            config.network.host = host.clone();
        }

        if let Some(user) = &self.user {
            config.credentials.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.credentials.password = Some(password.clone());
        }

        if self.no_webdav {
            config.services.webdav = false;
        }
        if self.no_rest {
            config.services.rest = false;
        }
        if self.no_restxq {
            config.services.restxq = false;
        }

        if self.quiet {
            config.logging.quiet = true;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
        if self.verbose {
            config.http.verbose = true;
        }
    }
}

/// Ask for a password on the console until a non-empty one is entered.
pub fn prompt_password() -> std::io::Result<String> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "Password: ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "No password entered",
            ));
        }
        let password = line.trim_end_matches(['\r', '\n']);
        if !password.is_empty() {
            return Ok(password.to_string());
        }
    }
}
