//! Error types for the user agent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The SIP socket could not be bound. Fatal at startup.
    #[error("failed to bind SIP socket on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The registrar hostname did not resolve.
    #[error("cannot resolve registrar {0}")]
    Resolve(String),

    /// Socket-level failure after startup.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-level failure from the SIP core.
    #[error(transparent)]
    Sip(#[from] voicebridge_sip_core::Error),

    /// Media-port allocation failed while answering an INVITE.
    #[error(transparent)]
    Rtp(#[from] voicebridge_rtp_core::Error),

    /// Operation referenced a dialog that does not exist.
    #[error("unknown dialog {0}")]
    UnknownDialog(String),
}

pub type Result<T> = std::result::Result<T, Error>;
