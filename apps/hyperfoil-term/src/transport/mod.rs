//! Websocket plumbing between the session core and the web CLI endpoint.

pub mod reconnect;
pub mod websocket;

pub use reconnect::ReconnectPolicy;
pub use websocket::WebSocketTransport;
pub use websocket::config::WebSocketConfig;

use crate::protocol::Frame;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("transport has shut down")]
    Closed,
}

/// Connection lifecycle and inbound traffic, in the order they happened.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting { attempt: u32 },
    Opened,
    Frame(Frame),
    Closed { reason: Option<String> },
    Reconnecting { attempt: u32, delay: Duration },
    /// The reconnect policy ran out of attempts.
    GaveUp,
}
