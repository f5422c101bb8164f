//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track connection state (Open → Draining → Closing → Closed)
//! - Generate unique connection IDs for tracing
//! - Expose the open-connection count to the shutdown coordinator
//!
//! The count is mutated only by [`ConnectionTracker::track`] and
//! [`ConnectionGuard`]'s drop, i.e. by the accept and close paths.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is open and processing requests.
    Open,
    /// Connection is draining (no new requests, finishing in-flight).
    Draining,
    /// Teardown in progress (graceful close or reset).
    Closing,
    /// Connection is closed.
    Closed,
}

/// Tracks open connections for graceful shutdown.
///
/// The open count lives in a watch channel so waiters are woken on every change
/// instead of polling.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    /// Label used in logs and metrics.
    name: &'static str,
    /// Current count of open connections.
    open: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            name,
            open: Arc::new(tx),
        }
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        let mut count = 0;
        self.open.send_modify(|open| {
            *open += 1;
            count = *open;
        });
        metrics::record_open_connections(self.name, count);

        ConnectionGuard {
            tracker: self.clone(),
            id: ConnectionId::new(),
            peer,
            state: ConnectionState::Open,
        }
    }

    /// Get current open connection count.
    pub fn open_count(&self) -> u64 {
        *self.open.borrow()
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|open| *open == 0).await;
    }

    /// Wait until idle or `timeout` elapses. Returns `true` if idle.
    pub async fn wait_until_idle_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_until_idle()).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the open count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: ConnectionTracker,
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`. Transitions never go backwards.
    pub fn set_state(&mut self, next: ConnectionState) {
        if rank(next) <= rank(self.state) {
            return;
        }
        tracing::trace!(
            connection_id = %self.id,
            peer_addr = %self.peer,
            from = ?self.state,
            to = ?next,
            "Connection state change"
        );
        self.state = next;
    }
}

fn rank(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Open => 0,
        ConnectionState::Draining => 1,
        ConnectionState::Closing => 2,
        ConnectionState::Closed => 3,
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.set_state(ConnectionState::Closed);
        let mut count = 0;
        self.tracker.open.send_modify(|open| {
            *open = open.saturating_sub(1);
            count = *open;
        });
        metrics::record_open_connections(self.tracker.name, count);
        tracing::trace!(connection_id = %self.id, peer_addr = %self.peer, "Connection closed");
    }
}
