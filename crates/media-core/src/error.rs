//! Error types for the media layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A frame handed to the adapter had the wrong length for its rate.
    #[error("bad frame length: expected {expected} bytes, got {actual}")]
    BadFrameLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
