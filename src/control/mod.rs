//! Reset-capable control listener.
//!
//! A deliberately minimal HTTP/1.x responder on raw TCP, so the socket is in
//! our hands when the response decision is made:
//!
//! ```text
//! GET /reset?do=false  → 200 "OK", FIN
//! GET /reset?do=true   → nothing written, SO_LINGER{on, 0}, RST
//! ```
//!
//! Every connection carries exactly one request.

pub mod request;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ControlConfig;
use crate::net::listener::{Listener, ListenerError, ACCEPT_ERROR_BACKOFF};
use crate::net::teardown;
use crate::observability::metrics;

pub use request::{parse_flag, parse_request_head, reset_requested, RequestHead};

/// How long to keep reading after our FIN so unread client bytes don't turn
/// the close into a reset.
const LINGERING_CLOSE: Duration = Duration::from_secs(1);

/// What to do with a control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Write a response and close gracefully.
    Respond { status: &'static str, body: &'static str },
    /// Close with a reset, writing nothing.
    Reset,
}

impl ControlAction {
    fn respond(status: &'static str, body: &'static str) -> Self {
        Self::Respond { status, body }
    }
}

/// Route a parsed request.
pub fn decide(head: &RequestHead) -> ControlAction {
    if head.path != "/reset" {
        return ControlAction::respond("404 Not Found", "Not Found");
    }
    if head.method != "GET" {
        return ControlAction::respond("405 Method Not Allowed", "Method Not Allowed");
    }
    if reset_requested(head) {
        ControlAction::Reset
    } else {
        ControlAction::respond("200 OK", "OK")
    }
}

pub struct ControlServer {
    listener: Listener,
    read_timeout: Duration,
}

impl ControlServer {
    pub fn bind(config: &ControlConfig) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.bind_address, config.backlog, config.max_connections)?;
        Ok(Self {
            listener,
            read_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(address = %addr, "Control listener listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer, permit)) => {
                    metrics::record_connection("control");
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_control_connection(stream, peer, read_timeout).await;
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Control accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

enum HeadRead {
    Complete(Vec<u8>),
    Closed,
    TooLarge,
    TimedOut,
}

async fn read_head(stream: &mut TcpStream, read_timeout: Duration) -> std::io::Result<HeadRead> {
    let read = async {
        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(if buf.is_empty() {
                    HeadRead::Closed
                } else {
                    HeadRead::Complete(buf)
                });
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = request::head_end(&buf) {
                buf.truncate(end);
                return Ok(HeadRead::Complete(buf));
            }
            if buf.len() > request::MAX_HEAD_BYTES {
                return Ok(HeadRead::TooLarge);
            }
        }
    };

    match tokio::time::timeout(read_timeout, read).await {
        Ok(result) => result,
        Err(_) => Ok(HeadRead::TimedOut),
    }
}

/// Serve one control request on `stream`.
pub async fn handle_control_connection(mut stream: TcpStream, peer: SocketAddr, read_timeout: Duration) {
    let head = match read_head(&mut stream, read_timeout).await {
        Ok(HeadRead::Complete(head)) => head,
        Ok(HeadRead::Closed) => return,
        Ok(HeadRead::TooLarge) => {
            respond(stream, peer, "400 Bad Request", "Bad Request").await;
            return;
        }
        Ok(HeadRead::TimedOut) => {
            respond(stream, peer, "408 Request Timeout", "Request Timeout").await;
            return;
        }
        Err(e) => {
            tracing::debug!(peer_addr = %peer, error = %e, "Control read failed");
            return;
        }
    };

    let action = match parse_request_head(&head) {
        Ok(head) => {
            tracing::info!(
                peer_addr = %peer,
                method = %head.method,
                path = %head.path,
                query = head.query.as_deref().unwrap_or(""),
                "Control request"
            );
            decide(&head)
        }
        Err(e) => {
            tracing::debug!(peer_addr = %peer, error = %e, "Malformed control request");
            ControlAction::respond("400 Bad Request", "Bad Request")
        }
    };

    match action {
        ControlAction::Respond { status, body } => respond(stream, peer, status, body).await,
        ControlAction::Reset => {
            tracing::info!(peer_addr = %peer, "Resetting control connection");
            teardown::abort(stream, "control");
        }
    }
}

async fn respond(mut stream: TcpStream, peer: SocketAddr, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(peer_addr = %peer, error = %e, "Control write failed");
        return;
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(peer_addr = %peer, error = %e, "Control shutdown failed");
        return;
    }

    // Drain until the client closes its side, bounded.
    let mut sink = [0u8; 1024];
    let _ = tokio::time::timeout(LINGERING_CLOSE, async {
        while let Ok(n) = stream.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(line: &str) -> RequestHead {
        parse_request_head(format!("{line}\r\n\r\n").as_bytes()).unwrap()
    }

    #[test]
    fn routes_reset_requests() {
        assert_eq!(decide(&head("GET /reset?do=true HTTP/1.1")), ControlAction::Reset);
        assert_eq!(
            decide(&head("GET /reset?do=false HTTP/1.1")),
            ControlAction::respond("200 OK", "OK")
        );
        assert_eq!(
            decide(&head("GET /reset HTTP/1.1")),
            ControlAction::respond("200 OK", "OK")
        );
    }

    #[test]
    fn rejects_other_paths_and_methods() {
        assert_eq!(
            decide(&head("GET /other HTTP/1.1")),
            ControlAction::respond("404 Not Found", "Not Found")
        );
        assert_eq!(
            decide(&head("POST /reset?do=true HTTP/1.1")),
            ControlAction::respond("405 Method Not Allowed", "Method Not Allowed")
        );
    }
}
