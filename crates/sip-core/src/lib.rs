//! SIP wire primitives for voicebridge.
//!
//! This crate models the slice of SIP the bridge actually speaks with
//! a residential gateway over UDP: request/response parsing and
//! serialization, RFC 2617 digest authentication, and the SDP
//! offer/answer exchange for G.711 audio. Transaction and dialog state
//! live above, in `voicebridge-sip-client`.

pub mod auth;
pub mod error;
pub mod message;
pub mod sdp;

pub use auth::{digest_authorization, DigestChallenge};
pub use error::{Error, Result};
pub use message::{
    generate_branch, generate_call_id, generate_tag, parse_message, Headers, Method, Request,
    Response, SipMessage,
};
pub use sdp::{build_answer, parse_sdp, select_pcmu, CodecChoice, MediaDescription};
