//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → TraceLayer spans per HTTP request, tagged with x-request-id
//!
//! Consumer:
//!     → logging.rs (fmt subscriber on stdout, EnvFilter)
//! ```

pub mod logging;

pub use logging::init_logging;
