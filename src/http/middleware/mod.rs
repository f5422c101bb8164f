//! Cross-cutting HTTP middleware for the debug service.

pub mod access_log;

pub use access_log::access_log;
