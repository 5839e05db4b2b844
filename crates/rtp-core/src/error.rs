//! Error types for the RTP layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Datagram too short to hold the structure being parsed.
    #[error("buffer too small: needed {required} bytes, had {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// The version field in the fixed header was not 2.
    #[error("invalid RTP version {0}")]
    InvalidVersion(u8),

    /// No free media port could be bound in the configured range.
    #[error("no media port available in {low}..={high}")]
    NoPortAvailable { low: u16, high: u16 },

    /// Socket-level failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
