//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the harness.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the harness.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// TCP echo listener.
    pub tcp_echo: TcpEchoConfig,

    /// UDP echo listener.
    pub udp_echo: UdpEchoConfig,

    /// Reset-capable control listener.
    pub control: ControlConfig,

    /// Debug HTTP service.
    pub debug: DebugServiceConfig,

    /// Drain sequencing for the debug service.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Seconds to wait before binding any listener.
    pub startup_delay_secs: u64,
}

/// TCP echo listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpEchoConfig {
    /// Bind address (e.g., "0.0.0.0:5600").
    pub bind_address: String,

    /// Listen backlog.
    pub backlog: u32,

    /// Bytes read per chunk.
    pub buffer_size: usize,

    /// Maximum concurrent sessions (backpressure).
    pub max_connections: usize,
}

impl Default for TcpEchoConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5600".to_string(),
            backlog: 128,
            buffer_size: 1024,
            max_connections: 10_000,
        }
    }
}

/// UDP echo listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpEchoConfig {
    /// Bind address (e.g., "0.0.0.0:5700").
    pub bind_address: String,

    /// Largest datagram echoed; longer datagrams are truncated by the OS.
    pub buffer_size: usize,
}

impl Default for UdpEchoConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5700".to_string(),
            buffer_size: 65_535,
        }
    }
}

/// Control listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Bind address (e.g., "0.0.0.0:5800").
    pub bind_address: String,

    /// Listen backlog.
    pub backlog: u32,

    /// How long a client may take to send its request head.
    pub read_timeout_secs: u64,

    /// Maximum concurrent control connections (backpressure).
    pub max_connections: usize,
}

impl ControlConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5800".to_string(),
            backlog: 128,
            read_timeout_secs: 10,
            max_connections: 1024,
        }
    }
}

/// Debug HTTP service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugServiceConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). The `PORT` env var overrides the port.
    pub bind_address: String,

    /// Listen backlog.
    pub backlog: u32,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Time allowed for a handler to produce its response head.
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for the peer to acknowledge a response before
    /// a tagged connection is reset.
    pub reset_flush_timeout_ms: u64,

    /// Ceiling for `/stress/memory` allocations, in MiB.
    pub max_stress_memory_mb: u64,
}

impl DebugServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reset_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_flush_timeout_ms)
    }
}

impl Default for DebugServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 1024,
            max_connections: 10_000,
            request_timeout_secs: 60,
            reset_flush_timeout_ms: 1_000,
            max_stress_memory_mb: 4_096,
        }
    }
}

/// Graceful shutdown timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for in-flight connections to finish.
    pub handler_timeout_secs: u64,

    /// Fixed wait after draining so peers can finish the FIN/ACK exchange.
    pub drain_window_secs: u64,
}

impl ShutdownConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_secs(self.drain_window_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 5,
            drain_window_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
