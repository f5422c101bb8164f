//! Network fault-injection harness library.

pub mod config;
pub mod control;
pub mod echo;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod stress;

pub use config::schema::HarnessConfig;
pub use http::DebugServer;
pub use lifecycle::{Harness, ShutdownCoordinator};
