//! Server-event dispatch: speaking state and tool-call assembly.
//!
//! The server announces a tool call through up to three event types.
//! `function_call_arguments.done` is the canonical trigger;
//! `output_item.added` is an early hint used to learn the tool name,
//! and `function_call.done` a late hint that fires only when the
//! canonical event never produced the invocation. Exactly one
//! [`ToolInvocation`] is emitted per call id.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::events::{ServerEvent, SessionInfo};

/// A complete tool call from the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Events the transport surfaces to the call engine.
#[derive(Debug)]
pub enum AiEvent {
    /// The server acknowledged the session.
    SessionCreated { session_id: Option<String> },
    /// Decoded PCM16 audio at the AI rate. Only emitted while the
    /// assistant is speaking; late chunks after an interruption are
    /// dropped.
    Audio(Bytes),
    /// The assistant was interrupted; buffered downlink audio is stale.
    Interrupted,
    /// A fully assembled tool call.
    ToolCall(ToolInvocation),
    /// The socket closed; the call must drain.
    Closed,
}

#[derive(Default)]
struct PendingCall {
    name: Option<String>,
    arguments: String,
}

/// Turns raw server events into [`AiEvent`]s.
pub(crate) struct EventDispatcher {
    speaking: Arc<AtomicBool>,
    session_id: Option<String>,
    pending: HashMap<String, PendingCall>,
    emitted: HashSet<String>,
}

impl EventDispatcher {
    pub(crate) fn new(speaking: Arc<AtomicBool>) -> Self {
        Self {
            speaking,
            session_id: None,
            pending: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    pub(crate) fn handle(&mut self, event: ServerEvent) -> Vec<AiEvent> {
        match event {
            ServerEvent::SessionCreated { session } => self.on_session_created(session),
            ServerEvent::SessionUpdated => {
                debug!("session configuration accepted");
                Vec::new()
            }
            ServerEvent::Error { error } => {
                warn!(
                    kind = error.kind.as_deref().unwrap_or("unknown"),
                    message = error.message.as_deref().unwrap_or(""),
                    "server reported an error"
                );
                Vec::new()
            }
            ServerEvent::ResponseCreated => {
                self.speaking.store(true, Ordering::Relaxed);
                Vec::new()
            }
            ServerEvent::ResponseDone => {
                self.speaking.store(false, Ordering::Relaxed);
                Vec::new()
            }
            ServerEvent::ResponseInterrupted => {
                self.speaking.store(false, Ordering::Relaxed);
                vec![AiEvent::Interrupted]
            }
            ServerEvent::SpeechStarted | ServerEvent::SpeechStopped => Vec::new(),
            ServerEvent::AudioDelta { delta } => self.on_audio_delta(&delta),
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                self.pending
                    .entry(call_id)
                    .or_default()
                    .arguments
                    .push_str(&delta);
                Vec::new()
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => self.on_arguments_done(call_id, name, arguments),
            ServerEvent::OutputItemAdded { item } => {
                if item.kind.as_deref() == Some("function_call") {
                    if let Some(call_id) = item.call_id {
                        let pending = self.pending.entry(call_id).or_default();
                        if pending.name.is_none() {
                            pending.name = item.name;
                        }
                        if let Some(arguments) = item.arguments {
                            if pending.arguments.is_empty() {
                                pending.arguments = arguments;
                            }
                        }
                    }
                }
                Vec::new()
            }
            ServerEvent::FunctionCallDone { call_id, name } => {
                let Some(call_id) = call_id else {
                    return Vec::new();
                };
                if self.emitted.contains(&call_id) {
                    return Vec::new();
                }
                let pending = self.pending.remove(&call_id).unwrap_or_default();
                let name = name.or(pending.name);
                match name {
                    Some(name) => self.emit_tool_call(call_id, name, &pending.arguments),
                    None => {
                        warn!(call_id, "tool call completed without a name, dropping");
                        Vec::new()
                    }
                }
            }
            ServerEvent::Other => Vec::new(),
        }
    }

    fn on_session_created(&mut self, session: SessionInfo) -> Vec<AiEvent> {
        self.session_id = session.id.clone();
        info!(session_id = session.id.as_deref().unwrap_or("?"), "session created");
        vec![AiEvent::SessionCreated {
            session_id: session.id,
        }]
    }

    fn on_audio_delta(&self, delta: &str) -> Vec<AiEvent> {
        if !self.speaking.load(Ordering::Relaxed) {
            // Late chunk after an interruption.
            return Vec::new();
        }
        match BASE64.decode(delta) {
            Ok(audio) => vec![AiEvent::Audio(Bytes::from(audio))],
            Err(e) => {
                warn!(error = %e, "undecodable audio delta dropped");
                Vec::new()
            }
        }
    }

    fn on_arguments_done(
        &mut self,
        call_id: String,
        name: Option<String>,
        arguments: String,
    ) -> Vec<AiEvent> {
        if self.emitted.contains(&call_id) {
            return Vec::new();
        }
        let pending = self.pending.remove(&call_id).unwrap_or_default();
        let raw = if arguments.is_empty() {
            pending.arguments
        } else {
            arguments
        };
        match name.or(pending.name) {
            Some(name) => self.emit_tool_call(call_id, name, &raw),
            None => {
                // Name may still arrive with function_call.done; put
                // the assembled arguments back.
                self.pending.insert(
                    call_id,
                    PendingCall {
                        name: None,
                        arguments: raw,
                    },
                );
                Vec::new()
            }
        }
    }

    fn emit_tool_call(&mut self, call_id: String, name: String, raw: &str) -> Vec<AiEvent> {
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!(call_id, error = %e, "malformed tool arguments, using empty object");
                serde_json::json!({})
            })
        };
        self.emitted.insert(call_id.clone());
        info!(call_id, tool = name, "tool call assembled");
        vec![AiEvent::ToolCall(ToolInvocation {
            call_id,
            name,
            arguments,
        })]
    }
}
