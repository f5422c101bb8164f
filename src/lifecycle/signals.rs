//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers (ctrl-c elsewhere)
//! - Forward every signal to [`ShutdownCoordinator::request_shutdown`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Repeated signals are forwarded too; the coordinator coalesces them
//! - Handlers are installed before any listener binds, so an early SIGTERM is
//!   never lost to the default disposition

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownCoordinator;

/// Install the handlers now and forward signals from a background task.
pub fn spawn_signal_listener(coordinator: ShutdownCoordinator) -> io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        Ok(tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = terminate.recv() => "SIGTERM",
                    Some(()) = interrupt.recv() => "SIGINT",
                    else => break,
                };
                tracing::info!(signal = name, "Signal received");
                coordinator.request_shutdown();
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(signal = "ctrl-c", "Signal received");
                coordinator.request_shutdown();
            }
        }))
    }
}
