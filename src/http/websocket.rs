//! WebSocket echo.
//!
//! # Design Decisions
//! - Text frames come back as `Echo: <text>`, binary frames with the same prefix
//! - Ping/pong handled transparently by the protocol layer
//! - An upgraded socket leaves the connection tracker; drain does not wait for it

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo,
    },
    http::Extensions,
    response::Response,
};

pub async fn websocket_handler(ws: WebSocketUpgrade, extensions: Extensions) -> Response {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ws.on_upgrade(move |socket| echo_socket(socket, peer))
}

/// Reply text for a text frame.
pub fn echo_text(text: &str) -> String {
    format!("Echo: {text}")
}

async fn echo_socket(mut socket: WebSocket, peer: Option<SocketAddr>) {
    tracing::debug!(peer_addr = ?peer, "WebSocket opened");

    while let Some(Ok(message)) = socket.recv().await {
        let reply = match message {
            Message::Text(text) => Message::Text(echo_text(text.as_str()).into()),
            Message::Binary(data) => {
                let mut echoed = b"Echo: ".to_vec();
                echoed.extend_from_slice(&data);
                Message::Binary(echoed.into())
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if socket.send(reply).await.is_err() {
            break;
        }
    }

    tracing::debug!(peer_addr = ?peer, "WebSocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_echo_is_prefixed() {
        assert_eq!(echo_text("hi"), "Echo: hi");
    }
}
