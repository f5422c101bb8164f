//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (PORT / STARTUP_DELAY env overrides)
//!     → validation.rs (semantic checks)
//!     → HarnessConfig (validated, immutable)
//!     → cloned into each listener at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults so the harness runs with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{
    ControlConfig, DebugServiceConfig, HarnessConfig, LogFormat, ObservabilityConfig,
    ShutdownConfig, TcpEchoConfig, UdpEchoConfig,
};
