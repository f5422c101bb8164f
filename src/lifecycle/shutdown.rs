//! Shutdown coordination for the debug service.
//!
//! ```text
//! Running ──request_shutdown()──▶ Draining ──idle or handler timeout──▶ GraceWait
//!                                                                           │
//!                                              drain window elapsed         ▼
//!                                                                        Exited
//! ```
//!
//! Signal delivery lives in `signals.rs` and only ever calls
//! [`ShutdownCoordinator::request_shutdown`]; the drain itself is driven by
//! the server that owns the listener.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::net::connection::ConnectionTracker;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting and serving.
    Running,
    /// Listener closed; in-flight connections finishing.
    Draining,
    /// Fixed wait so peers can complete the close handshake.
    GraceWait,
    /// Terminal.
    Exited,
}

#[derive(Debug)]
struct Inner {
    state: watch::Sender<ShutdownState>,
    drain_started: AtomicBool,
    requests: AtomicU64,
}

/// Process-wide shutdown session. Clones share state.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator in `Running`.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            inner: Arc::new(Inner {
                state,
                drain_started: AtomicBool::new(false),
                requests: AtomicU64::new(0),
            }),
        }
    }

    /// Ask for a graceful shutdown. Safe to call from any thread, any number
    /// of times; only the first call has an effect and returns `true`.
    pub fn request_shutdown(&self) -> bool {
        let seen = self.inner.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let started = self.inner.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if started {
            tracing::info!("Shutdown requested, draining");
        } else {
            tracing::info!(
                requests = seen,
                state = ?self.state(),
                "Shutdown already in progress, ignoring repeat request"
            );
        }
        started
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        *self.inner.state.borrow()
    }

    /// `true` until the first shutdown request.
    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.inner.state.subscribe()
    }

    /// Resolve once shutdown has been requested.
    pub async fn draining(&self) {
        self.wait_for(|state| state != ShutdownState::Running).await;
    }

    /// Resolve once the coordinator reaches `Exited`.
    pub async fn exited(&self) {
        self.wait_for(|state| state == ShutdownState::Exited).await;
    }

    async fn wait_for(&self, done: impl Fn(ShutdownState) -> bool) {
        let mut rx = self.subscribe();
        // The sender is owned by `inner`, which we hold, so this never errors.
        let _ = rx.wait_for(|state| done(*state)).await;
    }

    /// Run the drain sequence: wait for `tracker` to go idle (bounded by
    /// `handler_timeout`), hold `drain_window`, then exit.
    ///
    /// The caller must already have stopped accepting. Does nothing unless a
    /// shutdown was requested, and runs at most once; later callers just wait
    /// for `Exited`.
    ///
    /// Resolving is the exit signal: the state is `Exited` by then and the
    /// owner of the future is expected to let the process end.
    pub async fn drain(&self, tracker: &ConnectionTracker, handler_timeout: Duration, drain_window: Duration) {
        if self.is_running() {
            tracing::warn!("Drain called without a shutdown request");
            return;
        }
        if self.inner.drain_started.swap(true, Ordering::SeqCst) {
            self.exited().await;
            return;
        }

        let open = tracker.open_count();
        tracing::info!(open_connections = open, "Waiting for in-flight connections");

        if tracker.wait_until_idle_for(handler_timeout).await {
            tracing::info!("All connections closed");
        } else {
            tracing::warn!(
                open_connections = tracker.open_count(),
                timeout = ?handler_timeout,
                "Graceful shutdown did not complete in time, continuing"
            );
        }

        self.advance(ShutdownState::GraceWait);
        tracing::info!(window = ?drain_window, "Holding drain window");
        tokio::time::sleep(drain_window).await;

        self.advance(ShutdownState::Exited);
        tracing::info!("Drain complete");
    }

    fn advance(&self, next: ShutdownState) {
        self.inner.state.send_replace(next);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn peer() -> std::net::SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn repeat_requests_are_coalesced() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.is_running());

        assert!(coordinator.request_shutdown());
        assert!(!coordinator.request_shutdown());
        assert!(!coordinator.request_shutdown());
        assert_eq!(coordinator.state(), ShutdownState::Draining);
    }

    #[tokio::test]
    async fn drain_without_request_is_noop() {
        let coordinator = ShutdownCoordinator::new();
        let tracker = ConnectionTracker::new("test");

        coordinator.drain(&tracker, Duration::from_secs(1), Duration::from_secs(1)).await;
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert_ne!(coordinator.state(), ShutdownState::Exited);
    }

    #[tokio::test]
    async fn drain_waits_for_connections_then_window() {
        let coordinator = ShutdownCoordinator::new();
        let tracker = ConnectionTracker::new("test");
        let guard = tracker.track(peer());

        coordinator.request_shutdown();
        let start = Instant::now();

        let drain = {
            let coordinator = coordinator.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                coordinator
                    .drain(&tracker, Duration::from_secs(5), Duration::from_millis(200))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.state(), ShutdownState::Draining);

        drop(guard);
        let closed_at = Instant::now();
        drain.await.unwrap();

        assert_eq!(coordinator.state(), ShutdownState::Exited);
        assert!(closed_at.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn handler_timeout_bounds_the_wait() {
        let coordinator = ShutdownCoordinator::new();
        let tracker = ConnectionTracker::new("test");
        let _stuck = tracker.track(peer());

        coordinator.request_shutdown();
        let start = Instant::now();
        coordinator
            .drain(&tracker, Duration::from_millis(100), Duration::from_millis(50))
            .await;

        assert_eq!(coordinator.state(), ShutdownState::Exited);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn second_request_during_drain_keeps_window() {
        let coordinator = ShutdownCoordinator::new();
        let tracker = ConnectionTracker::new("test");

        coordinator.request_shutdown();
        let start = Instant::now();
        let drain = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .drain(&tracker, Duration::from_secs(1), Duration::from_millis(300))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!coordinator.request_shutdown());

        coordinator.exited().await;
        drain.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
