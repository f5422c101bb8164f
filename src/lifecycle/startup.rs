//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind every listener before any of them serves
//! - Start the echo and control listeners in the background
//! - Run the debug service until its drain finishes
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal, nothing runs degraded
//! - The echo and control listeners have no drain of their own; they stop
//!   when the process exits

use std::net::SocketAddr;

use crate::config::{ConfigError, HarnessConfig};
use crate::control::ControlServer;
use crate::echo::{TcpEchoServer, UdpEchoServer};
use crate::http::DebugServer;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::net::listener::ListenerError;

/// Top-level error for the harness binary.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{listener}: {source}")]
    Listener {
        listener: &'static str,
        #[source]
        source: ListenerError,
    },

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

fn bound<T>(listener: &'static str, result: Result<T, ListenerError>) -> Result<T, HarnessError> {
    result.map_err(|source| HarnessError::Listener { listener, source })
}

/// Addresses the listeners actually bound (useful with port 0).
#[derive(Debug, Clone, Copy)]
pub struct BoundAddrs {
    pub tcp_echo: SocketAddr,
    pub udp_echo: SocketAddr,
    pub control: SocketAddr,
    pub debug: SocketAddr,
}

/// All listeners, bound and ready to run.
pub struct Harness {
    tcp_echo: TcpEchoServer,
    udp_echo: UdpEchoServer,
    control: ControlServer,
    debug: DebugServer,
    addrs: BoundAddrs,
}

impl Harness {
    /// Bind every listener.
    pub fn bind(config: &HarnessConfig, coordinator: ShutdownCoordinator) -> Result<Self, HarnessError> {
        let tcp_echo = bound("tcp_echo", TcpEchoServer::bind(&config.tcp_echo))?;
        let udp_echo = bound("udp_echo", UdpEchoServer::bind(&config.udp_echo))?;
        let control = bound("control", ControlServer::bind(&config.control))?;
        let debug = bound(
            "debug",
            DebugServer::bind(&config.debug, &config.shutdown, coordinator),
        )?;

        let local = |name, addr: std::io::Result<SocketAddr>| {
            addr.map_err(|e| HarnessError::Listener {
                listener: name,
                source: ListenerError::Accept(e),
            })
        };
        let addrs = BoundAddrs {
            tcp_echo: local("tcp_echo", tcp_echo.local_addr())?,
            udp_echo: local("udp_echo", udp_echo.local_addr())?,
            control: local("control", control.local_addr())?,
            debug: local("debug", debug.local_addr())?,
        };

        Ok(Self {
            tcp_echo,
            udp_echo,
            control,
            debug,
            addrs,
        })
    }

    pub fn addrs(&self) -> BoundAddrs {
        self.addrs
    }

    /// Serve until the debug service has drained.
    pub async fn run(self) {
        let background = [
            tokio::spawn(self.tcp_echo.run()),
            tokio::spawn(self.udp_echo.run()),
            tokio::spawn(self.control.run()),
        ];

        self.debug.run().await;

        for task in background {
            task.abort();
        }
    }
}
