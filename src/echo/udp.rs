//! UDP echo listener.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::config::UdpEchoConfig;
use crate::net::listener::{bind_udp, parse_address, ListenerError};
use crate::observability::metrics;

/// Echoes each datagram to the address it came from.
///
/// A single receive loop: no per-sender state exists, so nothing needs
/// serializing, and one sender's replies leave in the order they arrived.
pub struct UdpEchoServer {
    socket: UdpSocket,
    buffer_size: usize,
}

impl UdpEchoServer {
    pub fn bind(config: &UdpEchoConfig) -> Result<Self, ListenerError> {
        let addr = parse_address(&config.bind_address)?;
        let socket = bind_udp(addr)?;
        Ok(Self {
            socket,
            buffer_size: config.buffer_size.max(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(address = %addr, "UDP echo listening");
        }

        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (n, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    // e.g. ICMP port unreachable from a previous reply.
                    tracing::debug!(error = %e, "UDP receive failed");
                    continue;
                }
            };

            tracing::trace!(peer_addr = %from, bytes = n, "UDP datagram received");
            match self.socket.send_to(&buf[..n], from).await {
                Ok(_) => metrics::record_datagram(n),
                Err(e) => tracing::debug!(peer_addr = %from, error = %e, "UDP send failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn echoes_only_to_sender() {
        let server = UdpEchoServer::bind(&UdpEchoConfig {
            bind_address: "127.0.0.1:0".into(),
            ..UdpEchoConfig::default()
        })
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bystander = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        bystander.connect(addr).await.unwrap();

        sender.send_to(b"ping", addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = tokio::time::timeout(Duration::from_secs(2), sender.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, addr);

        let stray = tokio::time::timeout(Duration::from_millis(100), bystander.recv(&mut buf)).await;
        assert!(stray.is_err(), "bystander must not receive the echo");
    }

    #[tokio::test]
    async fn empty_datagram_is_echoed() {
        let server = UdpEchoServer::bind(&UdpEchoConfig {
            bind_address: "127.0.0.1:0".into(),
            ..UdpEchoConfig::default()
        })
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"", addr).await.unwrap();

        let mut buf = [0u8; 4];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), sender.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
