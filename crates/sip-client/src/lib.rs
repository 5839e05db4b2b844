//! The voicebridge SIP user agent.
//!
//! One UDP socket, three concerns:
//!
//! - a registration state machine (REGISTER with digest retry,
//!   proactive refresh, exponential reconnect backoff),
//! - an OPTIONS keep-alive with a 90 s liveness window, NAT bindings
//!   on residential gateways die quietly otherwise,
//! - server transactions for incoming calls (INVITE/ACK/BYE) with SDP
//!   negotiation and media port allocation.
//!
//! The agent owns dialog records and emits immutable
//! [`SipClientEvent`]s over a channel; per-call state belongs to the
//! call engine, which talks back only through [`SipClient::hangup`]
//! and [`SipClient::release_dialog`].

pub mod client;
pub mod config;
pub mod dialog;
pub mod error;
pub mod events;

pub use client::SipClient;
pub use config::SipClientConfig;
pub use dialog::Dialog;
pub use error::{Error, Result};
pub use events::{IncomingCall, SipClientEvent};
