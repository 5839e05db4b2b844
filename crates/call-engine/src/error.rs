//! Error types for the call engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller or tool configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Controller request failed below HTTP (connect, timeout, body).
    #[error("controller request failed: {0}")]
    Controller(#[from] reqwest::Error),

    /// Controller answered with a non-success status.
    #[error("controller returned {status}: {body}")]
    ControllerStatus { status: u16, body: String },

    /// The AI session failed.
    #[error(transparent)]
    Ai(#[from] voicebridge_ai_core::Error),

    /// The SIP layer rejected an operation.
    #[error(transparent)]
    Sip(#[from] voicebridge_sip_client::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
