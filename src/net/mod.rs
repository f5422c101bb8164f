//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (socket2 bind with backlog, accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, open count for the drain)
//!     → teardown.rs (graceful FIN vs linger-zero RST)
//!     → Hand off to echo / control / HTTP layer
//!
//! Connection States:
//!     Open → Draining → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each debug connection tracked for graceful shutdown
//! - The reset decision is connection-scoped, never global

pub mod connection;
pub mod listener;
pub mod teardown;
