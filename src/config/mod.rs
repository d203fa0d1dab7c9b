//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli overrides (flags win over the file)
//!     → validation.rs (semantic checks, distinct ports)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the process never mutates it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{finalize, load_config, ConfigError};
pub use schema::{
    CredentialsConfig, DatabaseConfig, HttpConfig, LoggingConfig, NetworkConfig, PortConfig,
    ProcessMode, ServiceConfig, ServicesConfig, UserConfig,
};
pub use validation::{validate_config, validate_ports, ValidationError};
