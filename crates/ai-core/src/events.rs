//! The wire event model, one tagged variant per discriminator.
//!
//! Server events arrive as JSON objects discriminated by a `type`
//! string. Everything the bridge does not act on falls into
//! [`ServerEvent::Other`] so new server event types never break a
//! call.

use serde::{Deserialize, Serialize};

/// Events received from the AI backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorInfo,
    },

    /// The assistant started producing a response.
    #[serde(rename = "response.created")]
    ResponseCreated,

    /// The response finished normally.
    #[serde(rename = "response.done")]
    ResponseDone,

    /// The caller barged in and the response was cut short.
    #[serde(rename = "response.interrupted")]
    ResponseInterrupted,

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// A chunk of synthesized audio, base64 PCM16 at the AI rate.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        delta: String,
    },

    /// Partial tool-call arguments; accumulated per call id.
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        call_id: String,
        #[serde(default)]
        delta: String,
    },

    /// Canonical tool-call trigger: arguments are complete.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },

    /// Early hint that a function-call output item exists; seeds the
    /// pending-call table with the tool name.
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        item: OutputItem,
    },

    /// Late hint; emits only if the canonical trigger never fired.
    #[serde(rename = "response.function_call.done")]
    FunctionCallDone {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },

    /// Any event type the bridge does not act on.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorInfo {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputItem {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Events sent to the AI backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

/// Session configuration sent once after connect.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: TurnDetection,
    pub modalities: Vec<String>,
    pub tools: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

impl TurnDetection {
    /// Server-side voice activity detection; the backend decides when
    /// the caller's turn ends.
    pub fn server_vad() -> Self {
        Self {
            kind: "server_vad".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_session_created() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"session.created","session":{"id":"sess_1"}}"#)
                .unwrap();
        let ServerEvent::SessionCreated { session } = event else {
            panic!("wrong variant");
        };
        assert_eq!(session.id.as_deref(), Some("sess_1"));
    }

    #[test]
    fn deserializes_audio_delta() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio.delta","delta":"AAAA"}"#).unwrap();
        assert!(matches!(event, ServerEvent::AudioDelta { delta } if delta == "AAAA"));
    }

    #[test]
    fn deserializes_arguments_done_without_name() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.function_call_arguments.done","call_id":"c1","arguments":"{\"pin\":11833}"}"#,
        )
        .unwrap();
        let ServerEvent::FunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(call_id, "c1");
        assert!(name.is_none());
        assert!(arguments.contains("11833"));
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","limits":[]}"#).unwrap();
        assert!(matches!(event, ServerEvent::Other));
    }

    #[test]
    fn serializes_audio_append() {
        let json =
            serde_json::to_value(ClientEvent::InputAudioAppend { audio: "QUJD".into() }).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.append");
        assert_eq!(json["audio"], "QUJD");
    }

    #[test]
    fn serializes_session_update_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: "greet".into(),
                voice: "coral".into(),
                input_audio_format: "pcm16".into(),
                output_audio_format: "pcm16".into(),
                turn_detection: TurnDetection::server_vad(),
                modalities: vec!["text".into(), "audio".into()],
                tools: vec![],
            },
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["input_audio_format"], "pcm16");
    }

    #[test]
    fn serializes_tool_output_item() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: "c9".into(),
                output: r#"{"success":true}"#.into(),
            },
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "c9");
    }
}
