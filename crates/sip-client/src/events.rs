//! Events the user agent emits toward the application.

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use voicebridge_sip_core::CodecChoice;

/// A fully negotiated incoming call, ready for a media session.
///
/// Carries the already-bound media socket so the port advertised in
/// the SDP answer is exactly the one the session will use.
#[derive(Debug)]
pub struct IncomingCall {
    pub call_id: String,
    pub caller: String,
    pub codec: CodecChoice,
    pub remote_rtp: SocketAddr,
    pub local_rtp_port: u16,
    pub rtp_socket: UdpSocket,
}

/// Notifications from the user agent.
#[derive(Debug)]
pub enum SipClientEvent {
    /// Registration succeeded (initial or refresh).
    Registered,
    /// Registration lost; the agent is backing off and retrying.
    Unregistered,
    /// An INVITE was answered; the call engine should start a session.
    IncomingCall(IncomingCall),
    /// BYE received (or sent); the session for this call must drain.
    CallTerminated { call_id: String },
}
