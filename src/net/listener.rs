//! TCP/UDP listener construction with backpressure.
//!
//! # Responsibilities
//! - Bind to configured address with an explicit backlog
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Graceful handling of accept errors

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;

/// Pause after an accept error so a persistent failure (e.g. EMFILE)
/// doesn't spin the accept loop.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Bind address did not parse.
    #[error("Invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),
    /// The connection limiter was shut down.
    #[error("Listener closed")]
    Closed,
}

/// Parse a configured bind address.
pub fn parse_address(address: &str) -> Result<SocketAddr, ListenerError> {
    address.parse().map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })
}

/// Create a nonblocking TCP listener with SO_REUSEADDR and the given backlog.
pub fn bind_tcp(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ListenerError> {
    let bind = |addr: SocketAddr| -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog.min(i32::MAX as u32) as i32)?;
        TcpListener::from_std(socket.into())
    };

    bind(addr).map_err(|source| ListenerError::Bind { address: addr, source })
}

/// Create a nonblocking UDP socket.
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, ListenerError> {
    let bind = |addr: SocketAddr| -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        UdpSocket::from_std(socket.into())
    };

    bind(addr).map_err(|source| ListenerError::Bind { address: addr, source })
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to `address` with connection limits.
    pub fn bind(address: &str, backlog: u32, max_connections: usize) -> Result<Self, ListenerError> {
        let addr = parse_address(address)?;
        let listener = bind_tcp(addr, backlog)?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { address: addr, source })?;

        tracing::debug!(
            address = %local_addr,
            backlog,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        // Then accept the connection
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            peer_addr = %addr,
            available_permits = self.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let listener = Listener::bind("127.0.0.1:0", 16, 2).unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = Listener::bind("127.0.0.1:0", 16, 1).unwrap();
        let taken = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two listeners on one address.
        let err = Listener::bind(&taken.to_string(), 16, 1).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn bad_address_is_rejected() {
        assert!(matches!(
            parse_address("localhost"),
            Err(ListenerError::Address { .. })
        ));
    }
}
