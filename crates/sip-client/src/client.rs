//! The UDP user agent state machine.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use voicebridge_rtp_core::bind_media_socket;
use voicebridge_sip_core::{
    build_answer, digest_authorization, generate_branch, generate_call_id, generate_tag,
    parse_message, parse_sdp, select_pcmu, DigestChallenge, Method, Request, Response, SipMessage,
};

use crate::config::SipClientConfig;
use crate::dialog::Dialog;
use crate::error::{Error, Result};
use crate::events::{IncomingCall, SipClientEvent};

const USER_AGENT: &str = "voicebridge/0.1";

/// Outstanding client transactions time out after this long.
const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// OPTIONS keep-alive cadence while registered and idle.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Registration is declared dead after this much response silence.
const KEEPALIVE_WINDOW: Duration = Duration::from_secs(90);

/// Reconnect backoff schedule in seconds.
const BACKOFF_SECS: [u64; 7] = [1, 2, 4, 8, 16, 32, 60];

/// Digest retries per registration attempt.
const MAX_AUTH_RETRIES: u32 = 2;

/// Refresh when this fraction of the granted lifetime has elapsed.
const REFRESH_FRACTION: f64 = 0.8;

/// Pause before answering a digest challenge, mirroring gateway pacing.
const AUTH_RETRY_DELAY: Duration = Duration::from_millis(300);

const TICK: Duration = Duration::from_secs(1);

struct RegistrationState {
    /// Stable Call-ID shared by every REGISTER this agent sends.
    call_id: String,
    /// Strictly increasing over the lifetime of the agent.
    cseq: u32,
    tag: String,
    challenge: Option<DigestChallenge>,
    auth_attempts: u32,
    refresh_at: Option<Instant>,
    next_register_at: Option<Instant>,
    backoff_idx: usize,
    last_keepalive_rx: Instant,
    last_options_tx: Option<Instant>,
}

impl RegistrationState {
    fn schedule_backoff(&mut self, now: Instant) {
        let secs = BACKOFF_SECS[self.backoff_idx.min(BACKOFF_SECS.len() - 1)];
        self.backoff_idx = (self.backoff_idx + 1).min(BACKOFF_SECS.len() - 1);
        self.next_register_at = Some(now + Duration::from_secs(secs));
        self.refresh_at = None;
    }
}

struct PendingRequest {
    method: Method,
    /// Whether this request already carried an Authorization header.
    authed: bool,
    timeout: JoinHandle<()>,
}

struct Inner {
    config: SipClientConfig,
    registrar: SocketAddr,
    socket: Arc<UdpSocket>,
    local_ip: IpAddr,
    local_port: u16,
    state: Mutex<RegistrationState>,
    dialogs: DashMap<String, Dialog>,
    pending: DashMap<(String, u32), PendingRequest>,
    events_tx: mpsc::Sender<SipClientEvent>,
    registered: AtomicBool,
    running: AtomicBool,
    parse_errors: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The SIP user agent. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SipClient {
    inner: Arc<Inner>,
}

impl SipClient {
    /// Bind the signaling socket, start the receive and registrar
    /// tasks, and send the initial REGISTER.
    ///
    /// A bind failure is fatal: without the socket there is no agent.
    pub async fn start(
        config: SipClientConfig,
    ) -> Result<(Self, mpsc::Receiver<SipClientEvent>)> {
        let registrar = lookup_host((config.server.as_str(), config.port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| Error::Resolve(config.server.clone()))?;

        let local_ip = match config.bind_ip {
            Some(ip) => ip,
            None => detect_local_ip(registrar).await,
        };
        let bind_addr = SocketAddr::new(local_ip, config.bind_port.unwrap_or(5060));
        let socket = UdpSocket::bind(bind_addr).await.map_err(|source| Error::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
        let local_port = socket.local_addr()?.port();
        info!(%local_ip, local_port, registrar = %registrar, "SIP user agent bound");

        let (events_tx, events_rx) = mpsc::channel(16);
        let now = Instant::now();
        let inner = Arc::new(Inner {
            config,
            registrar,
            socket: Arc::new(socket),
            local_ip,
            local_port,
            state: Mutex::new(RegistrationState {
                call_id: generate_call_id(),
                cseq: 0,
                tag: generate_tag(),
                challenge: None,
                auth_attempts: 0,
                refresh_at: None,
                next_register_at: None,
                backoff_idx: 0,
                last_keepalive_rx: now,
                last_options_tx: None,
            }),
            dialogs: DashMap::new(),
            pending: DashMap::new(),
            events_tx,
            registered: AtomicBool::new(false),
            running: AtomicBool::new(true),
            parse_errors: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        });

        let recv_task = tokio::spawn(receive_loop(inner.clone()));
        let timer_task = tokio::spawn(registrar_loop(inner.clone()));
        inner.tasks.lock().extend([recv_task, timer_task]);

        inner.send_register(false, false).await;

        Ok((Self { inner }, events_rx))
    }

    /// Whether a registration is currently in force.
    pub fn registered(&self) -> bool {
        self.inner.registered.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::new(self.inner.local_ip, self.inner.local_port)
    }

    /// Dialogs that have not yet terminated.
    pub fn active_calls(&self) -> usize {
        self.inner
            .dialogs
            .iter()
            .filter(|d| d.is_active())
            .count()
    }

    /// Snapshot of one dialog.
    pub fn dialog(&self, call_id: &str) -> Option<Dialog> {
        self.inner.dialogs.get(call_id).map(|d| d.value().clone())
    }

    /// Datagrams dropped because they failed to parse.
    pub fn parse_errors(&self) -> u64 {
        self.inner.parse_errors.load(Ordering::Relaxed)
    }

    /// Send BYE for an active dialog (application-initiated teardown,
    /// e.g. the AI session died).
    pub async fn hangup(&self, call_id: &str) -> Result<()> {
        let inner = &self.inner;
        let dialog = inner
            .dialogs
            .get(call_id)
            .map(|d| d.value().clone())
            .ok_or_else(|| Error::UnknownDialog(call_id.to_string()))?;
        if dialog.terminated {
            return Ok(());
        }
        if let Some(mut entry) = inner.dialogs.get_mut(call_id) {
            entry.terminated = true;
        }

        let cseq = {
            let mut st = inner.state.lock();
            st.cseq += 1;
            st.cseq
        };
        let uri = format!("sip:{}@{}", dialog.caller, dialog.remote_sip.ip());
        let mut req = Request::new(Method::Bye, &uri);
        req.headers.push(
            "Via",
            format!(
                "SIP/2.0/UDP {}:{};branch={}",
                inner.local_ip,
                inner.local_port,
                generate_branch()
            ),
        );
        // Roles swap for in-dialog requests we originate.
        req.headers.push("From", dialog.local_to.clone());
        req.headers.push("To", dialog.remote_from.clone());
        req.headers.push("Call-ID", call_id);
        req.headers.push("CSeq", format!("{cseq} BYE"));
        req.headers.push("User-Agent", USER_AGENT);
        req.headers.push("Content-Length", "0");

        inner.track_pending(call_id.to_string(), cseq, Method::Bye, false);
        inner.send_raw(&req.to_wire(), dialog.remote_sip).await;
        info!(call_id, "sent BYE");
        Ok(())
    }

    /// Forget a dialog once the call engine has released its
    /// resources. Frees the Call-ID for refresh-window evaluation.
    pub fn release_dialog(&self, call_id: &str) {
        self.inner.dialogs.remove(call_id);
        trace!(call_id, "dialog released");
    }

    /// Unregister and stop all tasks.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::Relaxed) {
            return;
        }
        if inner.registered.load(Ordering::Relaxed) {
            let authed = inner.state.lock().challenge.is_some();
            inner.send_register(authed, true).await;
            // Give the unregister a moment on the wire before the
            // socket goes away.
            sleep(Duration::from_millis(100)).await;
        }
        for task in inner.tasks.lock().drain(..) {
            task.abort();
        }
        for entry in inner.pending.iter() {
            entry.value().timeout.abort();
        }
        inner.pending.clear();
        info!("SIP user agent stopped");
    }
}

async fn detect_local_ip(registrar: SocketAddr) -> IpAddr {
    // Route toward the registrar to learn the outbound interface; no
    // packet is sent by connect() on UDP.
    if let Ok(probe) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        if probe.connect(registrar).await.is_ok() {
            if let Ok(addr) = probe.local_addr() {
                return addr.ip();
            }
        }
    }
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

async fn receive_loop(inner: Arc<Inner>) {
    let mut buf = vec![0u8; 8192];
    while inner.running.load(Ordering::Relaxed) {
        let (len, from) = match inner.socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                if inner.running.load(Ordering::Relaxed) {
                    error!(error = %e, "SIP socket receive failed");
                }
                break;
            }
        };
        let text = String::from_utf8_lossy(&buf[..len]);
        match parse_message(&text) {
            Ok(message) => inner.handle_message(message, from).await,
            Err(e) => {
                inner.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, %from, "dropped unparseable datagram");
            }
        }
    }
    trace!("SIP receive loop terminated");
}

/// Registration, refresh, keep-alive and backoff timer machine.
async fn registrar_loop(inner: Arc<Inner>) {
    #[derive(Debug)]
    enum Action {
        Register { auth: bool },
        Options,
        Expired,
    }

    loop {
        sleep(TICK).await;
        if !inner.running.load(Ordering::Relaxed) {
            break;
        }
        let now = Instant::now();
        let idle = inner.dialogs.iter().all(|d| !d.is_active());

        let mut actions: Vec<Action> = Vec::new();
        {
            let mut st = inner.state.lock();
            if inner.registered.load(Ordering::Relaxed) {
                if now.duration_since(st.last_keepalive_rx) > KEEPALIVE_WINDOW {
                    st.schedule_backoff(now);
                    actions.push(Action::Expired);
                } else {
                    if idle && st.refresh_at.is_some_and(|t| now >= t) {
                        st.refresh_at = None;
                        st.auth_attempts = 0;
                        actions.push(Action::Register {
                            auth: st.challenge.is_some(),
                        });
                    }
                    if idle
                        && st
                            .last_options_tx
                            .map_or(true, |t| now.duration_since(t) >= KEEPALIVE_INTERVAL)
                    {
                        st.last_options_tx = Some(now);
                        actions.push(Action::Options);
                    }
                }
            } else if st.next_register_at.is_some_and(|t| now >= t) {
                st.next_register_at = None;
                st.auth_attempts = 0;
                actions.push(Action::Register { auth: false });
            }
        }

        for action in actions {
            match action {
                Action::Register { auth } => inner.send_register(auth, false).await,
                Action::Options => inner.send_options(false).await,
                Action::Expired => {
                    warn!("no keep-alive response for 90s, registration presumed dead");
                    inner.set_registered(false).await;
                }
            }
        }
    }
}

impl Inner {
    async fn send_raw(&self, text: &str, to: SocketAddr) {
        if let Err(e) = self.socket.send_to(text.as_bytes(), to).await {
            warn!(%to, error = %e, "SIP send failed");
        }
    }

    async fn set_registered(self: &Arc<Self>, value: bool) {
        let was = self.registered.swap(value, Ordering::Relaxed);
        if was != value {
            let event = if value {
                SipClientEvent::Registered
            } else {
                SipClientEvent::Unregistered
            };
            let _ = self.events_tx.send(event).await;
        }
    }

    fn track_pending(self: &Arc<Self>, call_id: String, cseq: u32, method: Method, authed: bool) {
        let key = (call_id, cseq);
        let watcher = self.clone();
        let timeout_key = key.clone();
        let timeout = tokio::spawn(async move {
            sleep(TRANSACTION_TIMEOUT).await;
            if let Some((_, expired)) = watcher.pending.remove(&timeout_key) {
                watcher.on_transaction_timeout(&timeout_key, expired.method).await;
            }
        });
        self.pending.insert(
            key,
            PendingRequest {
                method,
                authed,
                timeout,
            },
        );
    }

    async fn on_transaction_timeout(self: &Arc<Self>, key: &(String, u32), method: Method) {
        match method {
            Method::Register => {
                warn!(call_id = %key.0, cseq = key.1, "REGISTER timed out");
                self.state.lock().schedule_backoff(Instant::now());
                self.set_registered(false).await;
            }
            Method::Options => {
                debug!("OPTIONS timed out; liveness window will decide");
            }
            other => debug!(method = %other, "transaction timed out"),
        }
    }

    /// Send one REGISTER. Auth retries reuse the registration Call-ID
    /// with a fresh, strictly higher CSeq.
    async fn send_register(self: &Arc<Self>, with_auth: bool, unregister: bool) {
        let uri = format!("sip:{}", self.config.server);
        let (wire, call_id, cseq) = {
            let mut st = self.state.lock();
            st.cseq += 1;
            let cseq = st.cseq;

            let mut req = Request::new(Method::Register, &uri);
            req.headers.push(
                "Via",
                format!(
                    "SIP/2.0/UDP {}:{};branch={}",
                    self.local_ip,
                    self.local_port,
                    generate_branch()
                ),
            );
            req.headers.push(
                "From",
                format!(
                    "\"{}\" <sip:{}@{}>;tag={}",
                    self.config.display_name, self.config.username, self.config.server, st.tag
                ),
            );
            req.headers.push(
                "To",
                format!("<sip:{}@{}>", self.config.username, self.config.server),
            );
            req.headers.push("Call-ID", st.call_id.clone());
            req.headers.push("CSeq", format!("{cseq} REGISTER"));
            req.headers.push(
                "Contact",
                format!(
                    "<sip:{}@{}:{}>",
                    self.config.username, self.local_ip, self.local_port
                ),
            );
            let expires = if unregister { 0 } else { self.config.expires };
            req.headers.push("Expires", expires.to_string());
            req.headers.push("User-Agent", USER_AGENT);
            if with_auth {
                if let Some(challenge) = &st.challenge {
                    req.headers.push(
                        "Authorization",
                        digest_authorization(
                            &self.config.username,
                            &self.config.password,
                            "REGISTER",
                            &uri,
                            challenge,
                        ),
                    );
                }
            }
            req.headers.push("Content-Length", "0");
            (req.to_wire(), st.call_id.clone(), cseq)
        };

        debug!(call_id = %call_id, cseq, with_auth, unregister, "sending REGISTER");
        if !unregister {
            self.track_pending(call_id, cseq, Method::Register, with_auth);
        }
        self.send_raw(&wire, self.registrar).await;
    }

    /// Send one OPTIONS keep-alive with its own Call-ID.
    async fn send_options(self: &Arc<Self>, with_auth: bool) {
        let uri = format!("sip:{}", self.config.server);
        let (wire, call_id, cseq) = {
            let mut st = self.state.lock();
            st.cseq += 1;
            let cseq = st.cseq;
            let call_id = generate_call_id();

            let mut req = Request::new(Method::Options, &uri);
            req.headers.push(
                "Via",
                format!(
                    "SIP/2.0/UDP {}:{};branch={}",
                    self.local_ip,
                    self.local_port,
                    generate_branch()
                ),
            );
            req.headers.push(
                "From",
                format!(
                    "<sip:{}@{}>;tag={}",
                    self.config.username, self.config.server, st.tag
                ),
            );
            req.headers.push(
                "To",
                format!("<sip:{}@{}>", self.config.username, self.config.server),
            );
            req.headers.push("Call-ID", call_id.clone());
            req.headers.push("CSeq", format!("{cseq} OPTIONS"));
            req.headers.push("User-Agent", USER_AGENT);
            if with_auth {
                if let Some(challenge) = &st.challenge {
                    req.headers.push(
                        "Authorization",
                        digest_authorization(
                            &self.config.username,
                            &self.config.password,
                            "OPTIONS",
                            &uri,
                            challenge,
                        ),
                    );
                }
            }
            req.headers.push("Content-Length", "0");
            (req.to_wire(), call_id, cseq)
        };

        trace!(cseq, with_auth, "sending OPTIONS keep-alive");
        self.track_pending(call_id, cseq, Method::Options, with_auth);
        self.send_raw(&wire, self.registrar).await;
    }

    async fn handle_message(self: &Arc<Self>, message: SipMessage, from: SocketAddr) {
        match message {
            SipMessage::Response(resp) => self.handle_response(resp).await,
            SipMessage::Request(req) => match req.method {
                Method::Invite => self.handle_invite(req, from).await,
                Method::Ack => self.handle_ack(&req),
                Method::Bye => self.handle_bye(req, from).await,
                ref other => {
                    debug!(method = %other, %from, "ignoring unsupported request");
                }
            },
        }
    }

    /// Responses match outstanding requests by (Call-ID, CSeq number).
    async fn handle_response(self: &Arc<Self>, resp: Response) {
        let (call_id, cseq) = match (resp.call_id(), resp.cseq()) {
            (Ok(call_id), Ok((cseq, _))) => (call_id.to_string(), cseq),
            _ => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let Some((_, pending)) = self.pending.remove(&(call_id, cseq)) else {
            trace!(status = resp.status, cseq, "stray response");
            return;
        };
        pending.timeout.abort();

        // Any response from the registrar proves the path is alive.
        self.state.lock().last_keepalive_rx = Instant::now();

        match pending.method {
            Method::Register => self.handle_register_response(resp).await,
            Method::Options => self.handle_options_response(resp, pending.authed).await,
            Method::Bye => debug!(status = resp.status, "BYE transaction completed"),
            other => debug!(method = %other, status = resp.status, "response ignored"),
        }
    }

    async fn handle_register_response(self: &Arc<Self>, resp: Response) {
        match resp.status {
            200 => {
                let granted = resp.expires().unwrap_or(self.config.expires.max(1));
                let refresh =
                    Duration::from_secs_f64(granted as f64 * REFRESH_FRACTION);
                {
                    let mut st = self.state.lock();
                    let now = Instant::now();
                    st.refresh_at = Some(now + refresh);
                    st.next_register_at = None;
                    st.backoff_idx = 0;
                    st.auth_attempts = 0;
                    st.last_options_tx = Some(now);
                }
                info!(expires = granted, "registration accepted");
                self.set_registered(true).await;
            }
            401 | 407 => {
                let challenge = resp
                    .headers
                    .get("WWW-Authenticate")
                    .or_else(|| resp.headers.get("Proxy-Authenticate"))
                    .and_then(DigestChallenge::parse);
                let Some(challenge) = challenge else {
                    warn!("401 without a parseable digest challenge");
                    self.register_failed().await;
                    return;
                };

                let retry = {
                    let mut st = self.state.lock();
                    st.challenge = Some(challenge);
                    st.auth_attempts += 1;
                    st.auth_attempts <= MAX_AUTH_RETRIES
                };
                if retry {
                    debug!("answering digest challenge");
                    let agent = self.clone();
                    tokio::spawn(async move {
                        sleep(AUTH_RETRY_DELAY).await;
                        agent.send_register(true, false).await;
                    });
                } else {
                    warn!("too many authentication attempts, giving up");
                    self.register_failed().await;
                }
            }
            status if status >= 400 => {
                warn!(status, reason = %resp.reason, "registration rejected");
                self.register_failed().await;
            }
            status => debug!(status, "provisional REGISTER response ignored"),
        }
    }

    async fn register_failed(self: &Arc<Self>) {
        self.state.lock().schedule_backoff(Instant::now());
        self.set_registered(false).await;
    }

    async fn handle_options_response(self: &Arc<Self>, resp: Response, authed: bool) {
        // Liveness was refreshed in handle_response; a challenge gets
        // answered once, anything else needs no action.
        if resp.status == 401 && !authed {
            let challenge = resp
                .headers
                .get("WWW-Authenticate")
                .and_then(DigestChallenge::parse);
            if let Some(challenge) = challenge {
                self.state.lock().challenge = Some(challenge);
                self.send_options(true).await;
            }
        }
    }

    async fn handle_invite(self: &Arc<Self>, req: Request, from: SocketAddr) {
        let call_id = match req.call_id() {
            Ok(id) => id.to_string(),
            Err(_) => return,
        };
        if self.dialogs.contains_key(&call_id) {
            debug!(call_id, "INVITE retransmission ignored");
            return;
        }
        let caller = req.caller_identity().unwrap_or_else(|| "unknown".to_string());

        let offer = match parse_sdp(&req.body) {
            Ok(offer) => offer,
            Err(e) => {
                warn!(call_id, error = %e, "INVITE without usable SDP");
                self.respond(&req, from, 400, "Bad Request", None).await;
                return;
            }
        };
        let codec = select_pcmu(&offer);

        let rtp_socket = match bind_media_socket(self.local_ip).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(call_id, error = %e, "no media port available");
                self.respond(&req, from, 503, "Service Unavailable", None).await;
                return;
            }
        };
        let local_rtp_port = rtp_socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or_default();
        let answer = build_answer(self.local_ip, local_rtp_port, codec);

        self.respond(&req, from, 100, "Trying", None).await;
        self.respond(&req, from, 180, "Ringing", None).await;
        self.respond(&req, from, 200, "OK", Some(("application/sdp", answer)))
            .await;

        let remote_rtp = SocketAddr::new(
            offer.connection_ip.unwrap_or_else(|| from.ip()),
            offer.audio_port,
        );
        let tag = self.state.lock().tag.clone();
        let to_value = req.headers.get("To").unwrap_or_default().to_string();
        let dialog = Dialog {
            call_id: call_id.clone(),
            caller: caller.clone(),
            remote_sip: from,
            codec,
            remote_rtp,
            local_rtp_port,
            remote_from: req.headers.get("From").unwrap_or_default().to_string(),
            local_to: format!("{to_value};tag={tag}"),
            established: false,
            terminated: false,
        };
        self.dialogs.insert(call_id.clone(), dialog);
        info!(
            call_id,
            caller,
            payload_type = codec.payload_type,
            rtp_port = local_rtp_port,
            "incoming call answered"
        );

        let event = SipClientEvent::IncomingCall(IncomingCall {
            call_id,
            caller,
            codec,
            remote_rtp,
            local_rtp_port,
            rtp_socket,
        });
        if self.events_tx.send(event).await.is_err() {
            warn!("event channel closed, dropping incoming call");
        }
    }

    fn handle_ack(&self, req: &Request) {
        if let Ok(call_id) = req.call_id() {
            if let Some(mut dialog) = self.dialogs.get_mut(call_id) {
                dialog.established = true;
                debug!(call_id, "call established");
            }
        }
    }

    /// BYE gets its 200 immediately; teardown happens above us.
    async fn handle_bye(self: &Arc<Self>, req: Request, from: SocketAddr) {
        self.respond(&req, from, 200, "OK", None).await;

        let Ok(call_id) = req.call_id() else { return };
        let call_id = call_id.to_string();
        match self.dialogs.get_mut(&call_id) {
            Some(mut dialog) => {
                dialog.terminated = true;
                info!(call_id, "BYE received, call terminating");
            }
            None => {
                debug!(call_id, "BYE for unknown call");
                return;
            }
        }
        let _ = self
            .events_tx
            .send(SipClientEvent::CallTerminated { call_id })
            .await;
    }

    /// Build and send a response echoing the request's routing
    /// headers, with the agent's tag on To.
    async fn respond(
        &self,
        req: &Request,
        to: SocketAddr,
        status: u16,
        reason: &str,
        body: Option<(&str, String)>,
    ) {
        let mut resp = Response::new(status, reason);
        resp.headers
            .push("Via", req.headers.get("Via").unwrap_or_default());
        resp.headers
            .push("From", req.headers.get("From").unwrap_or_default());
        let to_value = req.headers.get("To").unwrap_or_default();
        let to_value = if to_value.contains("tag=") {
            to_value.to_string()
        } else {
            format!("{to_value};tag={}", self.state.lock().tag)
        };
        resp.headers.push("To", to_value);
        resp.headers
            .push("Call-ID", req.call_id().unwrap_or_default());
        resp.headers
            .push("CSeq", req.headers.get("CSeq").unwrap_or_default());
        resp.headers.push(
            "Contact",
            format!(
                "<sip:{}@{}:{}>",
                self.config.username, self.local_ip, self.local_port
            ),
        );
        match body {
            Some((content_type, content)) => {
                resp.headers.push("Content-Type", content_type);
                resp.headers.push("Content-Length", content.len().to_string());
                resp.body = content;
            }
            None => resp.headers.push("Content-Length", "0"),
        }
        self.send_raw(&resp.to_wire(), to).await;
    }
}
