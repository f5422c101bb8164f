//! Network fault-injection harness.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────┐
//!                     │                 FAULT HARNESS                   │
//!                     │                                                 │
//!   TCP  :5600  ──────┼─▶ echo::tcp      (bytes back, FIN on EOF)       │
//!   UDP  :5700  ──────┼─▶ echo::udp      (datagram back to sender)      │
//!   TCP  :5800  ──────┼─▶ control        (GET /reset?do= → FIN or RST)  │
//!   HTTP :8080  ──────┼─▶ http::server   (debug routes, reset tagging)  │
//!                     │                                                 │
//!                     │  ┌───────────────────────────────────────────┐ │
//!                     │  │ config │ observability │ lifecycle/signals │ │
//!                     │  └───────────────────────────────────────────┘ │
//!                     └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use fault_harness::config::resolve_config;
use fault_harness::lifecycle::signals::spawn_signal_listener;
use fault_harness::lifecycle::{Harness, HarnessError, ShutdownCoordinator};
use fault_harness::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fault-harness")]
#[command(about = "TCP/UDP echo, reset injection and a debug HTTP service", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref()).map_err(HarnessError::from)?;

    if cli.check {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fault-harness starting");

    tracing::info!(
        tcp_echo = %config.tcp_echo.bind_address,
        udp_echo = %config.udp_echo.bind_address,
        control = %config.control.bind_address,
        debug = %config.debug.bind_address,
        drain_window_secs = config.shutdown.drain_window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let coordinator = ShutdownCoordinator::new();
    spawn_signal_listener(coordinator.clone()).map_err(HarnessError::Signals)?;

    if config.startup_delay_secs > 0 {
        tracing::info!(seconds = config.startup_delay_secs, "Delaying startup");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.startup_delay_secs)) => {}
            _ = coordinator.draining() => {
                tracing::info!("Shutdown requested during startup delay");
                return Ok(());
            }
        }
    }

    let harness = Harness::bind(&config, coordinator.clone())?;
    let addrs = harness.addrs();
    tracing::info!(
        tcp_echo = %addrs.tcp_echo,
        udp_echo = %addrs.udp_echo,
        control = %addrs.control,
        debug = %addrs.debug,
        "Listening"
    );

    // Returns once the debug service's drain has reached `Exited`.
    harness.run().await;

    tracing::info!(state = ?coordinator.state(), "Shutdown complete");
    Ok(())
}
