//! Audio framing and rate matching for voicebridge.
//!
//! The [`AudioAdapter`] sits between the RTP pipeline (PCM16 at the
//! telephone rate, rigid 20 ms frames) and the AI session (PCM16 at
//! 24 kHz, variable-size chunks). It owns the queues and the byte
//! accumulator that turn one domain's cadence into the other's, and it
//! degrades to silence instead of blocking past the frame deadline.

pub mod adapter;
pub mod error;

pub use adapter::{AudioAdapter, AI_SAMPLE_RATE, FRAME_DURATION};
pub use error::{Error, Result};
