//! Error types for codec operations.

use thiserror::Error;

/// Errors produced by codec primitives.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A PCM16 byte buffer must contain whole little-endian samples.
    #[error("PCM16 buffer length {len} is not a multiple of 2")]
    UnalignedPcm { len: usize },
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
