//! Error types for the AI transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint URL could not be turned into a WebSocket request.
    #[error("invalid realtime endpoint: {0}")]
    Endpoint(String),

    /// WebSocket-level failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Event serialization failure.
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The session is gone; no further events can be sent.
    #[error("realtime session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
