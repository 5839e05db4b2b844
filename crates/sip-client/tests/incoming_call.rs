//! INVITE/ACK/BYE handling against a scripted caller.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use voicebridge_sip_client::{SipClient, SipClientConfig, SipClientEvent};
use voicebridge_sip_core::{parse_message, Response, SipMessage};

struct Peer {
    socket: UdpSocket,
    client_addr: SocketAddr,
}

impl Peer {
    /// Start the agent with this socket acting as its registrar, and
    /// swallow the initial REGISTER so the call flow starts clean.
    async fn start() -> (Self, SipClient, tokio::sync::mpsc::Receiver<SipClientEvent>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_port = socket.local_addr().unwrap().port();

        let config = SipClientConfig::new("127.0.0.1", "930", "pw")
            .with_port(peer_port)
            .with_bind(Some("127.0.0.1".parse().unwrap()), Some(0));
        let (client, events) = SipClient::start(config).await.unwrap();

        let mut buf = vec![0u8; 8192];
        let (_, client_addr) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("no initial REGISTER")
            .unwrap();

        (
            Self {
                socket,
                client_addr,
            },
            client,
            events,
        )
    }

    async fn send(&self, text: String) {
        self.socket
            .send_to(text.as_bytes(), self.client_addr)
            .await
            .unwrap();
    }

    async fn recv_response(&self) -> Response {
        let mut buf = vec![0u8; 8192];
        let (len, _) = timeout(Duration::from_secs(5), self.socket.recv_from(&mut buf))
            .await
            .expect("no response from agent")
            .unwrap();
        let text = String::from_utf8_lossy(&buf[..len]).to_string();
        match parse_message(&text).unwrap() {
            SipMessage::Response(resp) => resp,
            SipMessage::Request(req) => panic!("expected response, got {} request", req.method),
        }
    }

    fn invite(&self, call_id: &str, payload_types: &str, rtpmaps: &str) -> String {
        let sdp = format!(
            "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\n\
             t=0 0\r\nm=audio 40000 RTP/AVP {payload_types}\r\n{rtpmaps}"
        );
        let peer_port = self.socket.local_addr().unwrap().port();
        format!(
            "INVITE sip:930@127.0.0.1 SIP/2.0\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:{peer_port};branch=z9hG4bKpeer1\r\n\
             From: \"Alice\" <sip:+4915112345678@127.0.0.1>;tag=remote1\r\n\
             To: <sip:930@127.0.0.1>\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:alice@127.0.0.1>\r\n\
             Content-Type: application/sdp\r\n\
             Content-Length: {}\r\n\r\n{sdp}",
            sdp.len(),
        )
    }

    fn in_dialog(&self, method: &str, call_id: &str, cseq: u32, to_tag: &str) -> String {
        let peer_port = self.socket.local_addr().unwrap().port();
        format!(
            "{method} sip:930@127.0.0.1 SIP/2.0\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:{peer_port};branch=z9hG4bKpeer{cseq}\r\n\
             From: \"Alice\" <sip:+4915112345678@127.0.0.1>;tag=remote1\r\n\
             To: <sip:930@127.0.0.1>;tag={to_tag}\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: {cseq} {method}\r\n\
             Content-Length: 0\r\n\r\n"
        )
    }
}

fn to_tag(resp: &Response) -> String {
    let to = resp.headers.get("To").unwrap();
    to.split("tag=").nth(1).unwrap().to_string()
}

#[tokio::test]
async fn answers_pcmu_invite_with_sdp() {
    let (peer, client, mut events) = Peer::start().await;
    peer.send(peer.invite(
        "call-1",
        "0 8",
        "a=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\n",
    ))
    .await;

    let trying = peer.recv_response().await;
    assert_eq!(trying.status, 100);
    assert!(trying.headers.get("To").unwrap().contains("tag="));

    let ringing = peer.recv_response().await;
    assert_eq!(ringing.status, 180);

    let ok = peer.recv_response().await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.headers.get("Content-Type"), Some("application/sdp"));
    assert!(ok.body.contains("RTP/AVP 0\r\n"));
    assert!(ok.body.contains("a=rtpmap:0 PCMU/8000\r\n"));
    assert!(ok.body.contains("a=sendrecv\r\n"));

    let media_port: u16 = ok
        .body
        .lines()
        .find_map(|l| l.strip_prefix("m=audio "))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|p| p.parse().ok())
        .unwrap();
    assert!((10_000..=20_000).contains(&media_port));

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no call event")
        .unwrap();
    let SipClientEvent::IncomingCall(call) = event else {
        panic!("expected IncomingCall");
    };
    assert_eq!(call.call_id, "call-1");
    assert_eq!(call.caller, "+4915112345678");
    assert_eq!(call.codec.payload_type, 0);
    assert_eq!(call.local_rtp_port, media_port);
    assert_eq!(
        call.rtp_socket.local_addr().unwrap().port(),
        media_port,
        "advertised port must be the bound socket"
    );
    assert_eq!(call.remote_rtp, "127.0.0.1:40000".parse().unwrap());

    client.stop().await;
}

#[tokio::test]
async fn ack_establishes_and_bye_terminates() {
    let (peer, client, mut events) = Peer::start().await;
    peer.send(peer.invite("call-2", "0", "a=rtpmap:0 PCMU/8000\r\n"))
        .await;

    let _trying = peer.recv_response().await;
    let _ringing = peer.recv_response().await;
    let ok = peer.recv_response().await;
    assert_eq!(ok.status, 200);
    let tag = to_tag(&ok);

    let _call = timeout(Duration::from_secs(2), events.recv()).await.unwrap();

    peer.send(peer.in_dialog("ACK", "call-2", 1, &tag)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.dialog("call-2").unwrap().established);
    assert_eq!(client.active_calls(), 1);

    peer.send(peer.in_dialog("BYE", "call-2", 2, &tag)).await;
    let bye_ok = peer.recv_response().await;
    assert_eq!(bye_ok.status, 200);
    assert_eq!(bye_ok.headers.get("CSeq"), Some("2 BYE"));

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no termination event")
        .unwrap();
    assert!(matches!(
        event,
        SipClientEvent::CallTerminated { call_id } if call_id == "call-2"
    ));
    assert!(client.dialog("call-2").unwrap().terminated);
    assert_eq!(client.active_calls(), 0);

    client.release_dialog("call-2");
    assert!(client.dialog("call-2").is_none());

    client.stop().await;
}

#[tokio::test]
async fn accepts_dynamic_pcmu_at_advertised_rate() {
    let (peer, client, mut events) = Peer::start().await;
    peer.send(peer.invite(
        "call-3",
        "121 8",
        "a=rtpmap:121 PCMU/16000\r\na=rtpmap:8 PCMA/8000\r\n",
    ))
    .await;

    let _trying = peer.recv_response().await;
    let _ringing = peer.recv_response().await;
    let ok = peer.recv_response().await;
    assert!(ok.body.contains("RTP/AVP 121\r\n"));
    // The answer echoes the mislabelled rate; processing stays 8 kHz.
    assert!(ok.body.contains("a=rtpmap:121 PCMU/16000\r\n"));

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no call event")
        .unwrap();
    let SipClientEvent::IncomingCall(call) = event else {
        panic!("expected IncomingCall");
    };
    assert_eq!(call.codec.payload_type, 121);
    assert_eq!(call.codec.advertised_rate, 16000);
    assert_eq!(call.codec.internal_rate(), 8000);

    client.stop().await;
}
