// Error type shared by the connection, process, and reporting tasks.

use std::time::Duration;

use telemetry_core::packet::PacketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol: {0}")]
    Packet(#[from] PacketError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("connection closed during handshake")]
    Closed,
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("no traffic within {0:?}")]
    PingTimeout(Duration),
    #[error("bridge input channel closed")]
    BridgeClosed,
    #[error("empty command line")]
    EmptyCommand,
    #[error("command line: {0}")]
    CommandLine(#[from] shell_words::ParseError),
}
