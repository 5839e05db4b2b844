//! Dialog records for incoming calls.

use std::net::SocketAddr;
use voicebridge_sip_core::CodecChoice;

/// One established (or establishing) call, keyed by Call-ID.
///
/// Created when the INVITE is answered, removed by
/// [`crate::SipClient::release_dialog`] once the call engine has torn
/// the session down.
#[derive(Debug, Clone)]
pub struct Dialog {
    pub call_id: String,
    /// Caller identity from the From URI user part.
    pub caller: String,
    /// Where the peer's signaling came from.
    pub remote_sip: SocketAddr,
    /// Negotiated codec (payload type + advertised rate).
    pub codec: CodecChoice,
    /// Peer's RTP endpoint from its SDP offer.
    pub remote_rtp: SocketAddr,
    /// Locally allocated media port.
    pub local_rtp_port: u16,
    /// From header of the peer, reused verbatim as the To of outgoing
    /// in-dialog requests.
    pub remote_from: String,
    /// Our To header including the local tag.
    pub local_to: String,
    /// Set when the peer's ACK arrives.
    pub established: bool,
    /// Set when BYE has been received or sent; the session observes
    /// this and drains.
    pub terminated: bool,
}

impl Dialog {
    pub fn is_active(&self) -> bool {
        !self.terminated
    }
}
