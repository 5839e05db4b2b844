//! Streaming-AI transport for voicebridge.
//!
//! One WebSocket session per call. The transport pushes a steady
//! 20 ms cadence of base64 PCM16 frames upstream (the server-side
//! voice activity detector needs the stream to never pause), tracks
//! whether the assistant is currently speaking, and turns the server's
//! tagged event union into typed [`AiEvent`]s for the call engine:
//! decoded audio chunks, de-duplicated tool invocations, and session
//! death.
//!
//! There is no in-call reconnect. When the socket dies the call is
//! over; the caller hears silence and the telephone side hangs up.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod events;

pub use client::{AiSessionConfig, RealtimeClient};
pub use dispatch::{AiEvent, ToolInvocation};
pub use error::{Error, Result};
pub use events::{ClientEvent, ServerEvent, SessionUpdate};
