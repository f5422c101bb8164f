//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Bind all listeners → Serve
//!
//! Shutdown (shutdown.rs):
//!     request_shutdown() → Stop accepting → Drain connections → Drain window → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → request_shutdown()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listeners
//! - Ordered shutdown: stop accept, drain, wait, exit
//! - Drain is bounded; exit is delayed, never hastened

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownState};
pub use startup::{BoundAddrs, Harness, HarnessError};
