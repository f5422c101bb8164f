//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffers > 0, timeouts > 0, addresses parse)
//! - Detect listeners fighting over the same TCP address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HarnessConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::config::schema::HarnessConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{first} and {second} both bind TCP {address}")]
    AddressConflict {
        first: &'static str,
        second: &'static str,
        address: SocketAddr,
    },
}

/// Check a configuration, collecting every error.
pub fn validate_config(config: &HarnessConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let tcp_binds = [
        ("tcp_echo.bind_address", &config.tcp_echo.bind_address),
        ("control.bind_address", &config.control.bind_address),
        ("debug.bind_address", &config.debug.bind_address),
    ];

    let mut seen: HashMap<SocketAddr, &'static str> = HashMap::new();
    for (field, value) in tcp_binds {
        if let Some(addr) = check_address(field, value, &mut errors) {
            // Port 0 asks the OS for a fresh port, so it never collides.
            if addr.port() == 0 {
                continue;
            }
            if let Some(first) = seen.insert(addr, field) {
                errors.push(ValidationError::AddressConflict {
                    first,
                    second: field,
                    address: addr,
                });
            }
        }
    }

    check_address("udp_echo.bind_address", &config.udp_echo.bind_address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    let positive = [
        ("tcp_echo.backlog", config.tcp_echo.backlog as u64),
        ("tcp_echo.buffer_size", config.tcp_echo.buffer_size as u64),
        ("tcp_echo.max_connections", config.tcp_echo.max_connections as u64),
        ("udp_echo.buffer_size", config.udp_echo.buffer_size as u64),
        ("control.backlog", config.control.backlog as u64),
        ("control.read_timeout_secs", config.control.read_timeout_secs),
        ("control.max_connections", config.control.max_connections as u64),
        ("debug.backlog", config.debug.backlog as u64),
        ("debug.max_connections", config.debug.max_connections as u64),
        ("debug.request_timeout_secs", config.debug.request_timeout_secs),
        ("shutdown.handler_timeout_secs", config.shutdown.handler_timeout_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            None
        }
    }
}
