//! Connection teardown: graceful close vs hard reset.
//!
//! A [`ResetDirective`] is created per accepted connection and handed to the
//! requests served on it. [`ResetOnClose`] wraps the socket given to hyper and
//! consults the directive when hyper ends the connection:
//!
//! ```text
//! Graceful: poll_shutdown → shutdown(Write) → FIN
//! Reset:    poll_shutdown → flush → wait for peer ACK (bounded)
//!                         → SO_LINGER{on, 0} → skip FIN → drop → RST
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};

use crate::observability::metrics;

/// How often the kernel send queue is re-checked while waiting for the peer
/// to acknowledge the last response.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationMode {
    /// FIN handshake; everything sent is delivered.
    #[default]
    Graceful,
    /// Linger-zero close; the peer sees a reset.
    Reset,
}

/// Connection-scoped request to end the connection with a reset.
///
/// Clones share one flag. Once set it can't be cleared, so the mode can only
/// move from `Graceful` to `Reset`.
#[derive(Debug, Clone, Default)]
pub struct ResetDirective(Arc<AtomicBool>);

impl ResetDirective {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection for reset. Returns `true` for the call that set it.
    pub fn request_reset(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn mode(&self) -> TerminationMode {
        if self.0.load(Ordering::Acquire) {
            TerminationMode::Reset
        } else {
            TerminationMode::Graceful
        }
    }
}

/// Set linger to zero so the next close emits RST instead of FIN.
pub fn set_linger_zero(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).set_linger(Some(Duration::ZERO))
}

/// Reset `stream` immediately: linger-zero, then close.
///
/// A peer that is already gone makes this a no-op.
pub fn abort(stream: TcpStream, listener: &'static str) {
    match set_linger_zero(&stream) {
        Ok(()) => metrics::record_reset(listener),
        Err(e) => tracing::debug!(error = %e, "Linger-zero failed, peer already gone"),
    }
    drop(stream);
}

/// Bytes the peer has not acknowledged yet, where the platform can tell us.
#[cfg(target_os = "linux")]
fn unacked_bytes(stream: &TcpStream) -> io::Result<Option<usize>> {
    use std::os::fd::AsRawFd;

    let mut pending: libc::c_int = 0;
    // SAFETY: TIOCOUTQ writes a single c_int through the pointer, and the fd
    // is owned by `stream` for the duration of the call.
    let rc = unsafe { libc::ioctl(stream.as_raw_fd(), libc::TIOCOUTQ, &mut pending) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Some(pending.max(0) as usize))
}

#[cfg(not(target_os = "linux"))]
fn unacked_bytes(_stream: &TcpStream) -> io::Result<Option<usize>> {
    Ok(None)
}

struct AckWait {
    deadline: Instant,
    tick: Pin<Box<Sleep>>,
}

impl AckWait {
    fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            tick: Box::pin(tokio::time::sleep(ACK_POLL_INTERVAL)),
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        ready!(self.tick.as_mut().poll(cx));
        self.tick.as_mut().reset(Instant::now() + ACK_POLL_INTERVAL);
        Poll::Ready(())
    }
}

/// Socket adapter that ends the connection according to its [`ResetDirective`].
pub struct ResetOnClose {
    stream: TcpStream,
    peer: SocketAddr,
    directive: ResetDirective,
    flush_timeout: Duration,
    ack_wait: Option<AckWait>,
    armed: bool,
}

impl ResetOnClose {
    pub fn new(stream: TcpStream, peer: SocketAddr, directive: ResetDirective, flush_timeout: Duration) -> Self {
        Self {
            stream,
            peer,
            directive,
            flush_timeout,
            ack_wait: None,
            armed: false,
        }
    }

    fn arm_reset(&mut self) {
        if self.armed {
            return;
        }
        self.armed = true;
        match set_linger_zero(&self.stream) {
            Ok(()) => {
                metrics::record_reset("debug");
                tracing::debug!(peer_addr = %self.peer, "Connection armed for reset");
            }
            Err(e) => {
                tracing::debug!(peer_addr = %self.peer, error = %e, "Reset skipped, peer already gone");
            }
        }
    }

    /// Wait until the peer has acknowledged everything written, or the
    /// flush timeout passes.
    fn poll_acknowledged(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            let pending = match unacked_bytes(&self.stream) {
                Ok(Some(0)) => return Poll::Ready(()),
                Ok(pending) => pending,
                Err(e) => {
                    tracing::debug!(peer_addr = %self.peer, error = %e, "Send queue unavailable");
                    return Poll::Ready(());
                }
            };

            let timeout = self.flush_timeout;
            let wait = self.ack_wait.get_or_insert_with(|| AckWait::new(timeout));
            if wait.expired() {
                tracing::warn!(
                    peer_addr = %self.peer,
                    unacked = ?pending,
                    "Peer did not acknowledge response before reset"
                );
                return Poll::Ready(());
            }
            ready!(wait.poll_tick(cx));

            // No send-queue visibility: one settle interval is all we can do.
            if pending.is_none() {
                return Poll::Ready(());
            }
        }
    }
}

impl AsyncRead for ResetOnClose {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ResetOnClose {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.directive.mode() == TerminationMode::Graceful {
            return Pin::new(&mut this.stream).poll_shutdown(cx);
        }

        ready!(Pin::new(&mut this.stream).poll_flush(cx))?;
        ready!(this.poll_acknowledged(cx));
        this.arm_reset();
        // No FIN: the RST goes out when the socket is dropped.
        Poll::Ready(Ok(()))
    }
}

impl Drop for ResetOnClose {
    fn drop(&mut self) {
        // Covers connections that end without a shutdown call, e.g. on I/O error.
        if self.directive.mode() == TerminationMode::Reset {
            self.arm_reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[test]
    fn directive_is_sticky() {
        let directive = ResetDirective::new();
        assert_eq!(directive.mode(), TerminationMode::Graceful);

        let shared = directive.clone();
        assert!(shared.request_reset());
        assert!(!directive.request_reset());
        assert_eq!(directive.mode(), TerminationMode::Reset);
    }

    #[test]
    fn separate_directives_are_independent() {
        let first = ResetDirective::new();
        let second = ResetDirective::new();
        first.request_reset();
        assert_eq!(second.mode(), TerminationMode::Graceful);
    }

    #[tokio::test]
    async fn graceful_shutdown_sends_fin() {
        let (mut client, server, peer) = pair().await;
        let mut io = ResetOnClose::new(server, peer, ResetDirective::new(), Duration::from_secs(1));

        io.write_all(b"bye").await.unwrap();
        io.shutdown().await.unwrap();
        drop(io);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }

    #[tokio::test]
    async fn reset_delivers_written_bytes_then_resets() {
        let (mut client, server, peer) = pair().await;
        let directive = ResetDirective::new();
        let mut io = ResetOnClose::new(server, peer, directive.clone(), Duration::from_secs(1));

        directive.request_reset();
        io.write_all(b"last words").await.unwrap();
        io.shutdown().await.unwrap();
        drop(io);

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        let err = loop {
            match client.read(&mut buf).await {
                Ok(0) => panic!("expected reset, got orderly EOF"),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) => break e,
            }
        };
        assert_eq!(received, b"last words");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn abort_after_peer_left_is_noop() {
        let (client, server, _) = pair().await;
        drop(client);
        tokio::time::sleep(Duration::from_millis(20)).await;
        abort(server, "test");
    }
}
