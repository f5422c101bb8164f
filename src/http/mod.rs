//! Debug HTTP service.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (ResetOnClose socket, per-connection ResetDirective)
//!     → hyper HTTP/1.1 connection
//!     → request.rs (request ID) → middleware/ (access log)
//!     → handlers.rs / websocket.rs
//!     → response written; hyper shuts the socket down
//!     → ResetOnClose: FIN, or ACK wait + RST if the directive was set
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;
pub mod websocket;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{build_router, AppState, DebugServer};
