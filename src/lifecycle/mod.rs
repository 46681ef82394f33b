//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     AppConfig → metrics registry → router + built-in routes → cache
//!     → middleware chain → server
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT (signals.rs)  ─┐
//!     /rest/kill (slt mode)         ├→ Shutdown::trigger
//!     Server::stop                  ─┘        │
//!                                             ├→ server: stop accept → drain → close
//!                                             └→ cache stats collector: exit loop
//! ```
//!
//! # Design Decisions
//! - One coordinator, many subscribers; the signal is sticky once set
//! - Shutdown has a deadline: connections still open after the idle
//!   timeout are closed forcibly

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{forward_termination, termination_signal};
pub use startup::{App, StartupError};
