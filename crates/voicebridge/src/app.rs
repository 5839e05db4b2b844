//! The application event loop: one UA, one session per call.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use voicebridge_call_engine::CallSession;
use voicebridge_sip_client::{SipClient, SipClientConfig, SipClientEvent};

use crate::config::AppConfig;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let sip_config = SipClientConfig::new(
        config.sip.server.clone(),
        config.sip.username.clone(),
        config.sip.password.clone(),
    )
    .with_port(config.sip.port)
    .with_display_name(config.sip.display_name.clone())
    .with_bind(config.sip.bind_ip, config.sip.bind_port);

    let (sip, mut events) = SipClient::start(sip_config).await?;
    info!(agent = %sip.local_addr(), "waiting for calls");

    let catalog = Arc::new(config.tools);
    let registry = config.callers;
    let engine = config.engine;
    let mut sessions: HashMap<String, CallSession> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutdown requested");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("user agent event channel closed");
                    break;
                };
                match event {
                    SipClientEvent::Registered => info!("registered with gateway"),
                    SipClientEvent::Unregistered => warn!("registration lost, retrying"),
                    SipClientEvent::IncomingCall(incoming) => {
                        sessions.retain(|_, s| !s.is_dead());
                        let profile = registry.lookup(&incoming.caller);
                        info!(
                            call_id = incoming.call_id,
                            caller = incoming.caller,
                            tools = profile.available_tools.len(),
                            "starting call session"
                        );
                        let session = CallSession::spawn(
                            incoming,
                            sip.clone(),
                            catalog.clone(),
                            profile,
                            engine.clone(),
                        );
                        sessions.insert(session.call_id().to_string(), session);
                    }
                    SipClientEvent::CallTerminated { call_id } => {
                        // The session observes the dialog flag and
                        // drains itself; this is just bookkeeping.
                        info!(call_id, "call terminated");
                        sessions.retain(|_, s| !s.is_dead());
                    }
                }
            }
        }
    }

    for (call_id, session) in &sessions {
        info!(call_id, "aborting session for shutdown");
        session.abort();
    }
    sip.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
