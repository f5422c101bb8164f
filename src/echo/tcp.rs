//! TCP echo listener.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::TcpEchoConfig;
use crate::net::listener::{Listener, ListenerError, ACCEPT_ERROR_BACKOFF};
use crate::observability::metrics;

/// Echoes every byte back on the connection it arrived on.
pub struct TcpEchoServer {
    listener: Listener,
    buffer_size: usize,
}

impl TcpEchoServer {
    /// Bind the listener. Fails rather than running degraded.
    pub fn bind(config: &TcpEchoConfig) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.bind_address, config.backlog, config.max_connections)?;
        Ok(Self {
            listener,
            buffer_size: config.buffer_size.max(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept forever, one task per session.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(address = %addr, "TCP echo listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer, permit)) => {
                    metrics::record_connection("tcp_echo");
                    let buffer_size = self.buffer_size;
                    tokio::spawn(async move {
                        let _permit = permit;
                        echo_session(stream, peer, buffer_size).await;
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "TCP echo accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

/// Read a chunk, write the same bytes back, until the peer closes.
///
/// Errors end this session only.
pub async fn echo_session(mut stream: TcpStream, peer: SocketAddr, buffer_size: usize) {
    tracing::debug!(peer_addr = %peer, "TCP echo session started");
    let mut buf = vec![0u8; buffer_size];
    let mut echoed: u64 = 0;

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(peer_addr = %peer, error = %e, "TCP echo read failed");
                return;
            }
        };

        if let Err(e) = stream.write_all(&buf[..n]).await {
            tracing::debug!(peer_addr = %peer, error = %e, "TCP echo write failed");
            return;
        }
        echoed += n as u64;
    }

    let _ = stream.shutdown().await;
    tracing::debug!(peer_addr = %peer, bytes = echoed, "TCP echo session closed");
}
