//! The per-call session: Starting → Running → Draining → Dead.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use voicebridge_ai_core::{AiEvent, AiSessionConfig, RealtimeClient};
use voicebridge_codec_core::g711::{pcm16_to_ulaw, ulaw_to_pcm16};
use voicebridge_media_core::AudioAdapter;
use voicebridge_rtp_core::session::FRAME_INTERVAL;
use voicebridge_rtp_core::{RtpSession, RtpSessionConfig, RtpSessionHandle};
use voicebridge_sip_client::{IncomingCall, SipClient};

use crate::config::{CallerProfile, EngineConfig, ToolCatalog};
use crate::ha::HaClient;
use crate::tools::ToolGateway;

/// Pause between teardown and dialog release, absorbing in-flight
/// packets addressed to the dying media port.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How often the monitor re-checks the dialog and transports.
const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of one call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Draining,
    Dead,
}

/// Handle to a spawned session task.
pub struct CallSession {
    call_id: String,
    state: Arc<Mutex<SessionState>>,
    task: JoinHandle<()>,
}

impl CallSession {
    /// Spawn the session for an answered call. The task runs until
    /// the call drains (BYE, AI death or media failure) and releases
    /// the dialog itself.
    pub fn spawn(
        incoming: IncomingCall,
        sip: SipClient,
        catalog: Arc<ToolCatalog>,
        profile: CallerProfile,
        engine: EngineConfig,
    ) -> Self {
        let call_id = incoming.call_id.clone();
        let state = Arc::new(Mutex::new(SessionState::Starting));
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            run_session(incoming, sip, catalog, profile, engine, task_state).await;
        });
        Self {
            call_id,
            state,
            task,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_dead(&self) -> bool {
        self.state() == SessionState::Dead
    }

    /// Hard-stop the session task (process shutdown).
    pub fn abort(&self) {
        self.task.abort();
        *self.state.lock() = SessionState::Dead;
    }
}

fn set_state(state: &Arc<Mutex<SessionState>>, next: SessionState, call_id: &str) {
    *state.lock() = next;
    debug!(call_id, ?next, "session state");
}

async fn run_session(
    incoming: IncomingCall,
    sip: SipClient,
    catalog: Arc<ToolCatalog>,
    profile: CallerProfile,
    engine: EngineConfig,
    state: Arc<Mutex<SessionState>>,
) {
    let call_id = incoming.call_id.clone();
    let caller = incoming.caller.clone();
    info!(call_id, caller, "call session starting");

    // Starting: media plumbing first, then the AI session.
    let adapter = Arc::new(AudioAdapter::new(incoming.codec.internal_rate()));
    let rtp = Arc::new(
        RtpSession::new(
            incoming.rtp_socket,
            RtpSessionConfig::pcmu(incoming.remote_rtp, incoming.codec.payload_type),
        )
        .spawn(),
    );

    let ha = match HaClient::new(&engine.ha_base_url, &engine.ha_token) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(call_id, error = %e, "controller client failed to build");
            fail_early(&sip, &rtp, &call_id, &state).await;
            return;
        }
    };
    let gateway = Arc::new(ToolGateway::new(catalog, ha));

    let mut instructions = profile.instructions.clone();
    if let Some(guidance) = gateway.pin_guidance(&profile.available_tools) {
        instructions.push_str(guidance);
    }
    let tools = gateway.definitions(&profile.available_tools);

    let (ai, mut ai_events) = match RealtimeClient::connect(AiSessionConfig {
        endpoint: engine.ai_endpoint.clone(),
        api_key: engine.ai_api_key.clone(),
        model: engine.ai_model.clone(),
        voice: engine.ai_voice.clone(),
        instructions,
        tools,
    })
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            error!(call_id, error = %e, "AI session failed to connect");
            fail_early(&sip, &rtp, &call_id, &state).await;
            return;
        }
    };
    let ai = Arc::new(ai);

    // Let the assistant speak the greeting.
    if let Err(e) = ai.request_response().await {
        warn!(call_id, error = %e, "greeting request failed");
    }

    set_state(&state, SessionState::Running, &call_id);

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // SIP → uplink: decode each received G.711 payload into a
    // telephone-rate PCM16 frame.
    {
        let rtp = rtp.clone();
        let adapter = adapter.clone();
        let call_id = call_id.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let Some(payload) = rtp.recv_payload(FRAME_INTERVAL).await else {
                    continue;
                };
                let frame = Bytes::from(ulaw_to_pcm16(&payload));
                if let Err(e) = adapter.push_uplink(frame) {
                    debug!(call_id, error = %e, "uplink frame rejected");
                }
            }
        }));
    }

    // Uplink → AI: one frame per interval, silence included, so the
    // server-side voice activity detector never loses the cadence.
    {
        let adapter = adapter.clone();
        let ai = ai.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let frame = adapter.pull_uplink().await;
                if ai.send_audio(&frame).await.is_err() {
                    break;
                }
            }
        }));
    }

    // AI events → downlink and tool gateway.
    {
        let adapter = adapter.clone();
        let ai = ai.clone();
        let gateway = gateway.clone();
        let profile = Arc::new(profile);
        let call_id = call_id.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = ai_events.recv().await {
                match event {
                    AiEvent::Audio(chunk) => adapter.push_downlink(&chunk),
                    AiEvent::Interrupted => {
                        debug!(call_id, "assistant interrupted, flushing downlink");
                        adapter.clear_downlink();
                    }
                    AiEvent::ToolCall(invocation) => {
                        // Serviced out-of-band: a slow controller must
                        // not stall the audio path.
                        let gateway = gateway.clone();
                        let ai = ai.clone();
                        let profile = profile.clone();
                        let call_id = call_id.clone();
                        tokio::spawn(async move {
                            let result = gateway
                                .invoke(&profile, &invocation.name, invocation.arguments)
                                .await;
                            info!(
                                call_id,
                                tool = invocation.name,
                                success = result["success"].as_bool().unwrap_or(false),
                                "tool invocation finished"
                            );
                            if let Err(e) =
                                ai.submit_tool_result(&invocation.call_id, &result).await
                            {
                                warn!(call_id, error = %e, "tool result not delivered");
                            }
                        });
                    }
                    AiEvent::SessionCreated { session_id } => {
                        debug!(call_id, ?session_id, "AI session acknowledged");
                    }
                    AiEvent::Closed => break,
                }
            }
        }));
    }

    // Downlink → SIP: paced at the frame interval; the RTP queue only
    // ever holds a handful of frames.
    {
        let adapter = adapter.clone();
        let rtp = rtp.clone();
        let call_id = call_id.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_INTERVAL);
            loop {
                interval.tick().await;
                let frame = adapter.pull_downlink().await;
                match pcm16_to_ulaw(&frame) {
                    Ok(payload) => rtp.send_payload(Bytes::from(payload)),
                    Err(e) => debug!(call_id, error = %e, "unencodable downlink frame"),
                }
            }
        }));
    }

    // Monitor until something ends the call.
    let mut hangup_needed = false;
    loop {
        sleep(MONITOR_INTERVAL).await;
        match sip.dialog(&call_id) {
            Some(dialog) if dialog.terminated => {
                info!(call_id, "dialog terminated by peer");
                break;
            }
            None => {
                warn!(call_id, "dialog vanished");
                break;
            }
            Some(_) => {}
        }
        if !ai.is_alive() {
            info!(call_id, "AI session closed, hanging up");
            hangup_needed = true;
            break;
        }
        if rtp.is_closed() {
            warn!(call_id, "media session failed, hanging up");
            hangup_needed = true;
            break;
        }
    }

    // Draining: stop the loops, close transports in order, release
    // the dialog after a grace period.
    set_state(&state, SessionState::Draining, &call_id);
    for task in &tasks {
        task.abort();
    }
    ai.close();
    rtp.close();
    if hangup_needed {
        if let Err(e) = sip.hangup(&call_id).await {
            debug!(call_id, error = %e, "hangup after failure");
        }
    }
    sleep(DRAIN_GRACE).await;
    sip.release_dialog(&call_id);
    set_state(&state, SessionState::Dead, &call_id);
    info!(call_id, "call session finished");
}

async fn fail_early(
    sip: &SipClient,
    rtp: &RtpSessionHandle,
    call_id: &str,
    state: &Arc<Mutex<SessionState>>,
) {
    set_state(state, SessionState::Draining, call_id);
    rtp.close();
    if let Err(e) = sip.hangup(call_id).await {
        debug!(call_id, error = %e, "hangup for failed session");
    }
    sleep(DRAIN_GRACE).await;
    sip.release_dialog(call_id);
    set_state(state, SessionState::Dead, call_id);
}
