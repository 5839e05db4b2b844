//! The realtime WebSocket client.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{AiEvent, EventDispatcher};
use crate::error::{Error, Result};
use crate::events::{ClientEvent, ServerEvent, SessionUpdate, TurnDetection};

/// Time allowed for the server's session.created before configuring.
const SESSION_CREATE_GRACE: Duration = Duration::from_millis(500);

/// Pause between a tool result and the follow-up response.create, so
/// the server has ingested the output before speaking about it.
const TOOL_RESULT_GRACE: Duration = Duration::from_millis(300);

/// Everything needed to open one realtime session.
#[derive(Debug, Clone)]
pub struct AiSessionConfig {
    /// WebSocket endpoint, e.g. `wss://api.openai.com/v1/realtime`.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    /// Caller-specific instruction text.
    pub instructions: String,
    /// Projected tool schemas from the tool gateway.
    pub tools: Vec<serde_json::Value>,
}

/// Handle to one live session.
pub struct RealtimeClient {
    out_tx: mpsc::Sender<Message>,
    speaking: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Connect, start the pump tasks, and configure the session.
    ///
    /// The configuration event is sent after a short grace period for
    /// the server's `session.created`; the returned receiver carries
    /// audio, tool calls and the close notification.
    pub async fn connect(config: AiSessionConfig) -> Result<(Self, mpsc::Receiver<AiEvent>)> {
        let url = format!("{}?model={}", config.endpoint, config.model);
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| Error::Endpoint(e.to_string()))?;
        let bearer = format!("Bearer {}", config.api_key)
            .parse()
            .map_err(|_| Error::Endpoint("API key is not a valid header value".into()))?;
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, bearer);
        request.headers_mut().insert(
            "OpenAI-Beta",
            http::HeaderValue::from_static("realtime=v1"),
        );

        let (stream, _) = connect_async(request).await?;
        info!(model = %config.model, "realtime session connected");
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
        let (events_tx, events_rx) = mpsc::channel::<AiEvent>(64);
        let speaking = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "realtime send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_alive = alive.clone();
        let mut dispatcher = EventDispatcher::new(speaking.clone());
        let reader = tokio::spawn(async move {
            while let Some(incoming) = source.next().await {
                match incoming {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            for out in dispatcher.handle(event) {
                                if events_tx.send(out).await.is_err() {
                                    reader_alive.store(false, Ordering::Relaxed);
                                    return;
                                }
                            }
                        }
                        Err(e) => trace!(error = %e, "unparseable server event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "realtime socket error");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::Relaxed);
            let _ = events_tx.send(AiEvent::Closed).await;
        });

        let client = Self {
            out_tx,
            speaking,
            alive,
            tasks: vec![writer, reader],
        };

        sleep(SESSION_CREATE_GRACE).await;
        client
            .send_event(&ClientEvent::SessionUpdate {
                session: SessionUpdate {
                    instructions: config.instructions,
                    voice: config.voice,
                    input_audio_format: "pcm16".to_string(),
                    output_audio_format: "pcm16".to_string(),
                    turn_detection: TurnDetection::server_vad(),
                    modalities: vec!["text".to_string(), "audio".to_string()],
                    tools: config.tools,
                },
            })
            .await?;

        Ok((client, events_rx))
    }

    /// Whether the assistant is mid-response.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    /// Whether the socket is still up.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.out_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Push one 20 ms PCM16 frame at the AI rate. Sent continuously,
    /// silence included: the server VAD needs an unbroken cadence.
    pub async fn send_audio(&self, frame: &[u8]) -> Result<()> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        self.send_event(&ClientEvent::InputAudioAppend {
            audio: STANDARD.encode(frame),
        })
        .await
    }

    /// Ask the assistant to produce a response now (greeting, or after
    /// a tool result).
    pub async fn request_response(&self) -> Result<()> {
        self.send_event(&ClientEvent::ResponseCreate).await
    }

    /// Deliver a tool result and, after a grace delay, trigger the
    /// spoken follow-up.
    pub async fn submit_tool_result(
        &self,
        call_id: &str,
        output: &serde_json::Value,
    ) -> Result<()> {
        self.send_event(&ClientEvent::ConversationItemCreate {
            item: crate::events::ConversationItem::FunctionCallOutput {
                call_id: call_id.to_string(),
                output: output.to_string(),
            },
        })
        .await?;

        let out_tx = self.out_tx.clone();
        tokio::spawn(async move {
            sleep(TOOL_RESULT_GRACE).await;
            if let Ok(text) = serde_json::to_string(&ClientEvent::ResponseCreate) {
                let _ = out_tx.send(Message::Text(text.into())).await;
            }
        });
        Ok(())
    }

    /// Tear the session down.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Relaxed);
        let _ = self.out_tx.try_send(Message::Close(None));
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.close();
    }
}
