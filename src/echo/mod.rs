//! Raw echo listeners.
//!
//! # Data Flow
//! ```text
//! TCP: accept → task per session → read chunk → write same chunk → ... → EOF → close
//! UDP: recv_from → send_to(sender) → recv_from ...
//! ```
//!
//! No framing; TCP echo preserves stream order, not message boundaries.

pub mod tcp;
pub mod udp;

pub use tcp::TcpEchoServer;
pub use udp::UdpEchoServer;
