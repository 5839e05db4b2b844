//! Minimal RTP media transport for voicebridge.
//!
//! One [`RtpSession`] carries one telephone call over UDP: a paced
//! transmit loop that emits exactly one packet per 20 ms tick
//! (substituting G.711 silence when the application has nothing to
//! say), and a permissive receive loop that validates the fixed header
//! and hands payloads upward. There is no jitter buffer: the AI
//! backend consumes frames as a stream and tolerates reordering better
//! than it tolerates latency.
//!
//! Only the RFC 3550 fixed header is implemented. RTCP, padding,
//! extensions and CSRC lists are parsed past but never produced.

pub mod error;
pub mod packet;
pub mod queue;
pub mod session;

pub use error::{Error, Result};
pub use packet::{RtpHeader, RtpPacket, RTP_MIN_HEADER_SIZE, RTP_VERSION};
pub use queue::PayloadQueue;
pub use session::{bind_media_socket, RtpSession, RtpSessionConfig, RtpSessionHandle};

/// RTP sequence number (16 bits, wraps).
pub type RtpSequenceNumber = u16;
/// RTP timestamp (32 bits, wraps).
pub type RtpTimestamp = u32;
/// RTP synchronization source identifier.
pub type RtpSsrc = u32;
