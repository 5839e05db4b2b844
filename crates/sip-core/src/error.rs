//! Error types for SIP parsing and construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The datagram was not a parseable SIP message.
    #[error("malformed SIP message: {0}")]
    Parse(String),

    /// A header required by the current operation was absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// The SDP body could not be interpreted as an audio offer.
    #[error("malformed SDP: {0}")]
    Sdp(String),
}

pub type Result<T> = std::result::Result<T, Error>;
