//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (supervisor.rs):
//!     Validate ports → Database server → HTTP listener → Stop listener
//!
//! Separate process (process.rs):
//!     Ping HTTP port → Spawn child with -D → Poll until it answers
//!
//! Stop (stop.rs):
//!     Create marker → Wake stop listener → Listener stops HTTP server
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM or stop request → Stop accepting → Drain → Exit guard
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing binds before the ports are validated
//! - Ordered stop: database server first, then the HTTP listener
//! - Only startup failures are fatal; request failures never reach this layer

pub mod process;
pub mod shutdown;
pub mod signals;
pub mod stop;
pub mod supervisor;

pub use process::{ping, start_service, Launcher, ProcessLauncher};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use stop::{stop_signal, StopHandshakeError, StopListener, StopMarker};
pub use supervisor::{
    stop_instance, RunningService, ServiceHandle, StopFailure, Supervisor, SupervisorError,
};
