//! One browser connection: translates client messages into session calls and
//! model responses into client messages.

use crate::protocol::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use docchat_core::{SessionEngine, SessionSettings, StartConfig, ToolRegistry};
use docchat_realtime::types::audio::{decode_pcm, encode_pcm};
use docchat_realtime::types::events::inbound::ToolUse;
use docchat_realtime::{ResponseHandler, StreamClient, StreamError, StreamHandle};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages buffered towards a slow browser before the response loop waits.
const OUTBOUND_CAPACITY: usize = 256;

/// Shared by every connection of the process.
pub struct AppState {
    pub client: StreamClient,
    pub tools: Arc<ToolRegistry>,
    pub settings: SessionSettings,
    pub default_voice_id: String,
}

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    tracing::info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    // Spawn a task to forward messages from rx to the websocket sender
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(state, tx);
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => connection.handle_text(text.as_str()).await,
            Message::Binary(_) => {
                connection
                    .send(ServerMessage::Error {
                        error: "binary frames are not supported".to_string(),
                    })
                    .await
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    connection.close().await;
    send_task.abort();
    tracing::info!("WebSocket connection closed");
}

struct LiveSession {
    engine: Arc<SessionEngine>,
    stream: StreamHandle,
}

pub struct Connection {
    state: Arc<AppState>,
    outbound: mpsc::Sender<ServerMessage>,
    live: Option<LiveSession>,
}

impl Connection {
    pub fn new(state: Arc<AppState>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            state,
            outbound,
            live: None,
        }
    }

    /// Malformed messages are answered with an error; the connection stays open.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                tracing::warn!("malformed client message: {}", e);
                self.send(ServerMessage::Error {
                    error: format!("malformed message: {}", e),
                })
                .await;
            }
        }
    }

    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Start {
                voice_id,
                doc_scope,
            } => self.start(voice_id, doc_scope).await,
            ClientMessage::Audio { audio } => self.audio(&audio).await,
            ClientMessage::Stop => self.stop_session().await,
        }
    }

    /// Stops whatever session is live. Safe to call more than once.
    pub async fn close(&mut self) {
        self.stop_session().await;
    }

    async fn start(&mut self, voice_id: Option<String>, doc_scope: Option<String>) {
        if self.live.is_some() {
            tracing::info!("start received while a session is live, replacing it");
            self.stop_session().await;
        }

        let engine = SessionEngine::new(self.state.settings.clone(), Arc::clone(&self.state.tools));
        let config = StartConfig {
            voice_id: voice_id.unwrap_or_else(|| self.state.default_voice_id.clone()),
            doc_scope,
        };
        if let Err(e) = engine.start(config) {
            self.send(ServerMessage::Error {
                error: e.to_string(),
            })
            .await;
            return;
        }

        let forwarder = Arc::new(Forwarder {
            engine: Arc::clone(&engine),
            outbound: self.outbound.clone(),
        });
        match self
            .state
            .client
            .start_stream(Arc::clone(&engine), forwarder)
            .await
        {
            Ok(stream) => {
                tracing::info!(session = %engine.id(), "session ready");
                self.live = Some(LiveSession { engine, stream });
                self.send(ServerMessage::Ready).await;
            }
            Err(e) => {
                tracing::error!(session = %engine.id(), "failed to open stream: {}", e);
                engine.stop().await;
                self.send(ServerMessage::Error {
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn audio(&mut self, audio: &str) {
        let Some(live) = &self.live else {
            tracing::warn!("dropping audio, no session has been started");
            return;
        };
        let pcm = match decode_pcm(audio) {
            Ok(pcm) => pcm,
            Err(e) => {
                self.send(ServerMessage::Error {
                    error: format!("audio is not valid base64: {}", e),
                })
                .await;
                return;
            }
        };
        if let Err(e) = live.engine.enqueue_audio(pcm.into()) {
            tracing::warn!(session = %live.engine.id(), "audio frame refused: {}", e);
        }
    }

    async fn stop_session(&mut self) {
        let Some(LiveSession { engine, stream }) = self.live.take() else {
            return;
        };
        engine.stop().await;
        stream.abort();
        tracing::info!(
            session = %engine.id(),
            stats = ?engine.stats(),
            stream = ?stream.stats(),
            "session closed"
        );
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!("client went away, message dropped");
        }
    }
}

/// Relays model responses to the browser and tool calls to the session.
struct Forwarder {
    engine: Arc<SessionEngine>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Forwarder {
    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!(session = %self.engine.id(), "client went away, message dropped");
        }
    }
}

#[async_trait]
impl ResponseHandler for Forwarder {
    async fn on_audio(&self, pcm: Vec<u8>) {
        self.send(ServerMessage::Audio {
            data: encode_pcm(&pcm),
        })
        .await;
    }

    async fn on_text(&self, text: &str) {
        self.send(ServerMessage::Text {
            text: text.to_string(),
        })
        .await;
    }

    async fn on_tool_use(&self, tool_use: ToolUse) {
        let call = self.engine.handle_tool_call(
            tool_use.tool_use_id(),
            tool_use.tool_name(),
            tool_use.input().clone(),
        );
        if let Err(e) = call.await {
            tracing::error!(session = %self.engine.id(), "tool task failed: {}", e);
        }
    }

    async fn on_content_end(&self, stop_reason: Option<&str>) {
        self.send(ServerMessage::ContentEnd {
            stop_reason: stop_reason.map(str::to_string),
        })
        .await;
    }

    async fn on_interrupted(&self) {
        self.send(ServerMessage::Interrupted).await;
    }

    async fn on_error(&self, error: &StreamError) {
        self.send(ServerMessage::Error {
            error: error.to_string(),
        })
        .await;
        // The call is gone; nothing will pull the teardown any more.
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.stop().await });
    }
}
