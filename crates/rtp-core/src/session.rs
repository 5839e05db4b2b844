//! Per-call RTP session: paced transmit and permissive receive.

use bytes::Bytes;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use voicebridge_codec_core::g711::{SAMPLES_PER_FRAME, ULAW_SILENCE};

use crate::error::{Error, Result};
use crate::packet::{RtpHeader, RtpPacket};
use crate::queue::PayloadQueue;
use crate::RtpSsrc;

/// Media ports are allocated from this range, inclusive.
pub const MEDIA_PORT_LOW: u16 = 10_000;
pub const MEDIA_PORT_HIGH: u16 = 20_000;

/// One frame every 20 ms.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Queue depth in frames (≈ 320 ms of audio).
const QUEUE_CAPACITY: usize = 16;

const BIND_ATTEMPTS: usize = 64;

/// Bind a UDP socket on a random port inside the media range.
///
/// Called while building the SDP answer, before the session itself is
/// constructed, so the chosen port can be advertised to the peer.
pub async fn bind_media_socket(local_ip: IpAddr) -> Result<UdpSocket> {
    for _ in 0..BIND_ATTEMPTS {
        let port = rand::thread_rng().gen_range(MEDIA_PORT_LOW..=MEDIA_PORT_HIGH);
        match UdpSocket::bind((local_ip, port)).await {
            Ok(socket) => {
                debug!(%local_ip, port, "media socket bound");
                return Ok(socket);
            }
            Err(_) => continue,
        }
    }
    Err(Error::NoPortAvailable {
        low: MEDIA_PORT_LOW,
        high: MEDIA_PORT_HIGH,
    })
}

/// Wire parameters for one media session.
#[derive(Debug, Clone)]
pub struct RtpSessionConfig {
    /// Peer's RTP address from its SDP.
    pub remote: SocketAddr,
    /// Negotiated payload type (0, or the peer's dynamic PCMU type).
    pub payload_type: u8,
    /// Timestamp advance per frame. Always 160 for G.711: the codec is
    /// defined at 8 kHz even when the peer's rtpmap claims otherwise.
    pub samples_per_frame: u32,
    /// Payload bytes per frame.
    pub payload_len: usize,
    /// Byte value of one silent sample in the negotiated encoding.
    pub silence_byte: u8,
}

impl RtpSessionConfig {
    /// Standard G.711 μ-law session parameters.
    pub fn pcmu(remote: SocketAddr, payload_type: u8) -> Self {
        Self {
            remote,
            payload_type,
            samples_per_frame: SAMPLES_PER_FRAME as u32,
            payload_len: SAMPLES_PER_FRAME,
            silence_byte: ULAW_SILENCE,
        }
    }
}

#[derive(Default)]
struct RtpStats {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
}

/// An RTP session before its loops are spawned.
pub struct RtpSession {
    socket: Arc<UdpSocket>,
    config: RtpSessionConfig,
    ssrc: RtpSsrc,
}

impl RtpSession {
    pub fn new(socket: UdpSocket, config: RtpSessionConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            config,
            ssrc: rand::thread_rng().gen(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    /// Start the transmit and receive loops.
    pub fn spawn(self) -> RtpSessionHandle {
        let local_addr = self.socket.local_addr().ok();
        let outbound = Arc::new(PayloadQueue::new(QUEUE_CAPACITY));
        let inbound = Arc::new(PayloadQueue::new(QUEUE_CAPACITY));
        let closed = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(RtpStats::default());

        let send_task = tokio::spawn(send_loop(
            self.socket.clone(),
            self.config.clone(),
            self.ssrc,
            outbound.clone(),
            closed.clone(),
            stats.clone(),
        ));
        let recv_task = tokio::spawn(recv_loop(
            self.socket.clone(),
            inbound.clone(),
            closed.clone(),
            stats.clone(),
        ));

        RtpSessionHandle {
            outbound,
            inbound,
            local_addr,
            ssrc: self.ssrc,
            closed,
            stats,
            send_task,
            recv_task,
        }
    }
}

/// Transmit loop: one packet per 20 ms tick.
///
/// The interval is armed against the loop's own start instant, so a
/// slow iteration shortens the next sleep instead of accumulating
/// drift. Sequence numbers advance by exactly one per packet and the
/// timestamp by one frame of samples, silence included.
async fn send_loop(
    socket: Arc<UdpSocket>,
    config: RtpSessionConfig,
    ssrc: RtpSsrc,
    outbound: Arc<PayloadQueue>,
    closed: Arc<AtomicBool>,
    stats: Arc<RtpStats>,
) {
    let silence = Bytes::from(vec![config.silence_byte; config.payload_len]);
    let mut sequence: u16 = rand::thread_rng().gen();
    let mut timestamp: u32 = rand::thread_rng().gen();
    let mut interval = tokio::time::interval(FRAME_INTERVAL);

    loop {
        interval.tick().await;
        if closed.load(Ordering::Relaxed) {
            break;
        }

        let payload = outbound.try_pop().unwrap_or_else(|| silence.clone());
        let header = RtpHeader::new(config.payload_type, sequence, timestamp, ssrc);
        let wire = RtpPacket::new(header, payload).serialize();

        if let Err(e) = socket.send_to(&wire, config.remote).await {
            warn!(remote = %config.remote, error = %e, "RTP send failed");
            closed.store(true, Ordering::Relaxed);
            break;
        }

        sequence = sequence.wrapping_add(1);
        timestamp = timestamp.wrapping_add(config.samples_per_frame);
        stats.packets_sent.fetch_add(1, Ordering::Relaxed);
    }
    trace!("RTP send loop terminated");
}

/// Receive loop: validate the fixed header, hand the payload up.
///
/// Short datagrams and wrong versions are dropped and counted.
/// Unexpected payload types are forwarded without complaint.
async fn recv_loop(
    socket: Arc<UdpSocket>,
    inbound: Arc<PayloadQueue>,
    closed: Arc<AtomicBool>,
    stats: Arc<RtpStats>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        if closed.load(Ordering::Relaxed) {
            break;
        }
        let (len, _from) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "RTP receive failed");
                closed.store(true, Ordering::Relaxed);
                break;
            }
        };

        match RtpPacket::parse(&buf[..len]) {
            Ok(packet) => {
                stats.packets_received.fetch_add(1, Ordering::Relaxed);
                inbound.push(packet.payload);
            }
            Err(e) => {
                stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, len, "dropped non-RTP datagram");
            }
        }
    }
    trace!("RTP receive loop terminated");
}

/// Handle to a running session.
pub struct RtpSessionHandle {
    outbound: Arc<PayloadQueue>,
    inbound: Arc<PayloadQueue>,
    local_addr: Option<SocketAddr>,
    ssrc: RtpSsrc,
    closed: Arc<AtomicBool>,
    stats: Arc<RtpStats>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

impl RtpSessionHandle {
    /// Queue one encoded frame for the paced transmit loop.
    pub fn send_payload(&self, payload: Bytes) {
        self.outbound.push(payload);
    }

    /// Receive one payload, waiting at most `wait`.
    pub async fn recv_payload(&self, wait: Duration) -> Option<Bytes> {
        self.inbound.pop_within(wait).await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.stats.packets_sent.load(Ordering::Relaxed)
    }

    pub fn packets_received(&self) -> u64 {
        self.stats.packets_received.load(Ordering::Relaxed)
    }

    /// Stop both loops and release the socket.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.send_task.abort();
        self.recv_task.abort();
    }
}

impl Drop for RtpSessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
