use crate::error::StreamError;
use crate::transport::{DuplexTransport, InboundFrames, OutboundBody, WebSocketTransport};
use async_trait::async_trait;
use docchat_core::{SessionEngine, SessionState};
use docchat_realtime_types::audio::decode_pcm;
use docchat_realtime_types::events::inbound::ToolUse;
use docchat_realtime_types::{
    ContentType, GenerationStage, InboundEvent, Role, decode_inbound, encode_event,
};
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

mod config;
mod consts;
mod stats;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;
pub(crate) use utils::build_request;

/// Receives everything the model sends back during one stream.
///
/// Callbacks run on the response loop, except `on_tool_use`, which gets a task
/// of its own so that a slow tool never holds up audio.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Raw PCM16LE, 24 kHz, mono.
    async fn on_audio(&self, pcm: Vec<u8>);

    /// Final assistant text only.
    async fn on_text(&self, text: &str);

    async fn on_tool_use(&self, tool_use: ToolUse);

    async fn on_content_end(&self, stop_reason: Option<&str>);

    /// The user started talking over the assistant.
    async fn on_interrupted(&self) {}

    /// Called at most once, right before the stream ends with `error`.
    async fn on_error(&self, error: &StreamError);
}

pub struct StreamClient {
    transport: Arc<dyn DuplexTransport>,
    handshake_timeout: Duration,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn DuplexTransport>) -> Self {
        Self {
            transport,
            handshake_timeout: Duration::from_millis(consts::DEFAULT_HANDSHAKE_TIMEOUT_MS),
        }
    }

    /// A client talking to the model over a WebSocket described by `config`.
    pub fn from_config(config: Config) -> Self {
        let handshake_timeout = config.handshake_timeout();
        Self::new(Arc::new(WebSocketTransport::new(config)))
            .with_handshake_timeout(handshake_timeout)
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Opens the duplex call for `session` and starts dispatching responses to
    /// `handler`.
    ///
    /// The session's event sequence becomes the request body. Returns once the
    /// opening handshake has gone out, without waiting for the call to end.
    pub async fn start_stream(
        &self,
        session: Arc<SessionEngine>,
        handler: Arc<dyn ResponseHandler>,
    ) -> Result<StreamHandle, StreamError> {
        let session_id = session.id().to_string();
        let body: OutboundBody = session
            .generate_events()?
            .map(|item| -> Result<String, StreamError> {
                let event = item?;
                tracing::trace!("sending {}", event.name());
                Ok(encode_event(&event)?)
            })
            .boxed();

        let frames = self.transport.open(body).await?;
        tracing::info!(session = %session_id, "duplex call opened");

        let stats = Arc::new(Mutex::new(Stats::new()));
        let task = tokio::spawn(response_loop(
            Arc::clone(&session),
            frames,
            handler,
            Arc::clone(&stats),
        ));

        if let Err(e) = session.wait_active(self.handshake_timeout).await {
            tracing::error!(session = %session_id, "handshake failed: {}", e);
            task.abort();
            return Err(e.into());
        }
        Ok(StreamHandle { task, stats })
    }
}

/// The running response loop of one stream.
pub struct StreamHandle {
    task: JoinHandle<Result<(), StreamError>>,
    stats: Arc<Mutex<Stats>>,
}

impl StreamHandle {
    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the call to end. Resolves to the error that ended it, if any.
    pub async fn join(self) -> Result<(), StreamError> {
        self.task.await?
    }
}

fn record(stats: &Mutex<Stats>, update: impl FnOnce(&mut Stats)) {
    if let Ok(mut stats) = stats.lock() {
        update(&mut stats);
    } else {
        tracing::error!("failed to update stats");
    }
}

pub(crate) async fn response_loop(
    session: Arc<SessionEngine>,
    mut frames: InboundFrames,
    handler: Arc<dyn ResponseHandler>,
    stats: Arc<Mutex<Stats>>,
) -> Result<(), StreamError> {
    let session_id = session.id().to_string();
    // Stage of the assistant text content currently open.
    let mut stage = GenerationStage::Final;

    let outcome = loop {
        let frame = match frames.next().await {
            // Only a session that is already winding down may see the call end
            // without a completion end.
            None => match session.state() {
                SessionState::Starting | SessionState::Active => {
                    break Err(StreamError::Transport(
                        "call closed before completionEnd".to_string(),
                    ));
                }
                state => {
                    tracing::debug!(session = %session_id, "inbound stream ended ({:?})", state);
                    break Ok(());
                }
            },
            Some(Err(e)) => break Err(e),
            Some(Ok(frame)) => frame,
        };
        record(&stats, Stats::record_frame);

        let event = match decode_inbound(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(session = %session_id, "skipping unhandled event: {}", frame);
                continue;
            }
            Err(e) => {
                tracing::warn!(session = %session_id, "dropping malformed frame: {}", e);
                record(&stats, Stats::record_decode_error);
                continue;
            }
        };

        match event {
            InboundEvent::ContentStart(start) => {
                if start.role() == Some(Role::Assistant)
                    && start.content_type() == Some(ContentType::Text)
                {
                    stage = start.generation_stage();
                    tracing::debug!(session = %session_id, "assistant text content, {:?}", stage);
                }
            }
            InboundEvent::TextOutput(text) => {
                if text.is_interruption() {
                    tracing::info!(session = %session_id, "assistant interrupted");
                    handler.on_interrupted().await;
                    continue;
                }
                let forward = text.role() == Role::Assistant && stage == GenerationStage::Final;
                record(&stats, |stats| stats.record_text(forward));
                if forward {
                    handler.on_text(text.content()).await;
                }
            }
            InboundEvent::AudioOutput(audio) => match decode_pcm(audio.content()) {
                Ok(pcm) => {
                    record(&stats, |stats| stats.record_audio(pcm.len()));
                    handler.on_audio(pcm).await;
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, "dropping undecodable audio: {}", e);
                    record(&stats, Stats::record_decode_error);
                }
            },
            InboundEvent::ToolUse(tool_use) => {
                tracing::info!(
                    session = %session_id,
                    "tool use {} ({})",
                    tool_use.tool_name(),
                    tool_use.tool_use_id()
                );
                record(&stats, Stats::record_tool_use);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.on_tool_use(tool_use).await });
            }
            InboundEvent::ContentEnd(end) => handler.on_content_end(end.stop_reason()).await,
            InboundEvent::CompletionEnd(end) => {
                tracing::info!(session = %session_id, "completion ended: {:?}", end.stop_reason());
                break Ok(());
            }
            InboundEvent::Error(error) => break Err(StreamError::Model(error.message().to_string())),
        }
    };

    if let Err(e) = &outcome {
        tracing::error!(session = %session_id, "stream failed: {}", e);
        handler.on_error(e).await;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::{SessionSettings, SessionState, StartConfig, ToolRegistry};
    use docchat_realtime_types::Envelope;
    use docchat_realtime_types::audio::encode_pcm;
    use docchat_realtime_types::events::decode_outbound;
    use docchat_realtime_types::events::inbound::{
        AudioOutput, CompletionEnd, ContentEndOutput, ContentStartOutput, ModelError, TextOutput,
    };
    use futures::stream;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Audio(Vec<u8>),
        Text(String),
        ContentEnd(Option<String>),
        Interrupted,
        Error(String),
    }

    struct Recorder {
        seen: Mutex<Vec<Seen>>,
        tool_uses: mpsc::UnboundedSender<ToolUse>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ToolUse>) {
            let (tool_uses, rx) = mpsc::unbounded_channel();
            let recorder = Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                tool_uses,
            });
            (recorder, rx)
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }

        fn push(&self, seen: Seen) {
            self.seen.lock().unwrap().push(seen);
        }
    }

    #[async_trait]
    impl ResponseHandler for Recorder {
        async fn on_audio(&self, pcm: Vec<u8>) {
            self.push(Seen::Audio(pcm));
        }

        async fn on_text(&self, text: &str) {
            self.push(Seen::Text(text.to_string()));
        }

        async fn on_tool_use(&self, tool_use: ToolUse) {
            let _ = self.tool_uses.send(tool_use);
        }

        async fn on_content_end(&self, stop_reason: Option<&str>) {
            self.push(Seen::ContentEnd(stop_reason.map(str::to_string)));
        }

        async fn on_interrupted(&self) {
            self.push(Seen::Interrupted);
        }

        async fn on_error(&self, error: &StreamError) {
            self.push(Seen::Error(error.to_string()));
        }
    }

    /// Drains the request body into `sent` and replays a fixed script of
    /// inbound frames.
    struct ScriptedTransport {
        script: Mutex<Option<Vec<Result<String, StreamError>>>>,
        sent: Arc<Mutex<Vec<String>>>,
        // Keep the inbound side open until the body is finished.
        hold_open: bool,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<String, StreamError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                sent: Arc::new(Mutex::new(Vec::new())),
                hold_open: false,
            })
        }

        fn until_body_ends(script: Vec<Result<String, StreamError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                sent: Arc::new(Mutex::new(Vec::new())),
                hold_open: true,
            })
        }

        fn sent_names(&self) -> Vec<&'static str> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|frame| decode_outbound(frame).unwrap().name())
                .collect()
        }
    }

    #[async_trait]
    impl DuplexTransport for ScriptedTransport {
        async fn open(&self, mut body: OutboundBody) -> Result<InboundFrames, StreamError> {
            let sent = Arc::clone(&self.sent);
            let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
            tokio::spawn(async move {
                while let Some(Ok(frame)) = body.next().await {
                    sent.lock().unwrap().push(frame);
                }
                let _ = done_tx.send(());
            });
            let script = stream::iter(self.script.lock().unwrap().take().unwrap_or_default());
            if !self.hold_open {
                return Ok(script.boxed());
            }
            let tail = stream::once(done_rx)
                .filter_map(|_| async { None::<Result<String, StreamError>> });
            Ok(script.chain(tail).boxed())
        }
    }

    /// Accepts the call but never reads the body.
    struct StalledTransport {
        body: Mutex<Option<OutboundBody>>,
    }

    #[async_trait]
    impl DuplexTransport for StalledTransport {
        async fn open(&self, body: OutboundBody) -> Result<InboundFrames, StreamError> {
            *self.body.lock().unwrap() = Some(body);
            Ok(stream::pending().boxed())
        }
    }

    fn frame(event: InboundEvent) -> Result<String, StreamError> {
        Ok(serde_json::to_string(&Envelope::new(event)).unwrap())
    }

    fn assistant_text_start(stage: GenerationStage) -> Result<String, StreamError> {
        frame(InboundEvent::ContentStart(
            ContentStartOutput::new(Role::Assistant, ContentType::Text).with_generation_stage(stage),
        ))
    }

    fn text(content: &str, role: Role) -> Result<String, StreamError> {
        frame(InboundEvent::TextOutput(TextOutput::new(content, role)))
    }

    fn completion_end() -> Result<String, StreamError> {
        frame(InboundEvent::CompletionEnd(CompletionEnd::default()))
    }

    fn started_session() -> Arc<SessionEngine> {
        let session = SessionEngine::new(SessionSettings::default(), Arc::new(ToolRegistry::new()));
        session
            .start(StartConfig {
                voice_id: "matthew".to_string(),
                doc_scope: None,
            })
            .unwrap();
        session
    }

    async fn run(
        script: Vec<Result<String, StreamError>>,
    ) -> (Result<(), StreamError>, Stats, Arc<Recorder>) {
        let (recorder, _tool_uses) = Recorder::new();
        let client = StreamClient::new(ScriptedTransport::new(script));
        let handle = client
            .start_stream(started_session(), recorder.clone())
            .await
            .unwrap();
        let stats = Arc::clone(&handle.stats);
        let result = handle.join().await;
        let stats = stats.lock().unwrap().clone();
        (result, stats, recorder)
    }

    #[tokio::test]
    async fn only_final_assistant_text_is_forwarded() {
        let (result, stats, recorder) = run(vec![
            assistant_text_start(GenerationStage::Speculative),
            text("Revenue grew...", Role::Assistant),
            frame(InboundEvent::ContentStart(ContentStartOutput::new(
                Role::User,
                ContentType::Text,
            ))),
            text("what was revenue", Role::User),
            assistant_text_start(GenerationStage::Final),
            text("Revenue grew 12%.", Role::Assistant),
            completion_end(),
        ])
        .await;

        result.unwrap();
        assert_eq!(recorder.seen(), vec![Seen::Text("Revenue grew 12%.".to_string())]);
        assert_eq!(stats.text_forwarded(), 1);
        assert_eq!(stats.text_filtered(), 2);
    }

    #[tokio::test]
    async fn audio_and_content_end_reach_the_handler() {
        let (result, stats, recorder) = run(vec![
            frame(InboundEvent::AudioOutput(AudioOutput::new(&encode_pcm(&[1, 2, 3, 4])))),
            frame(InboundEvent::ContentEnd(ContentEndOutput::new("END_TURN"))),
            completion_end(),
        ])
        .await;

        result.unwrap();
        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Audio(vec![1, 2, 3, 4]),
                Seen::ContentEnd(Some("END_TURN".to_string()))
            ]
        );
        assert_eq!(stats.audio_bytes(), 4);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (result, stats, recorder) = run(vec![
            Ok("not json".to_string()),
            Ok(r#"{"event":{}}"#.to_string()),
            Ok(r#"{"event":{"usageEvent":{"totalTokens":12}}}"#.to_string()),
            Ok(r#"{"event":{"textOutput":{"content":42}}}"#.to_string()),
            text("still here", Role::Assistant),
            completion_end(),
        ])
        .await;

        result.unwrap();
        assert_eq!(recorder.seen(), vec![Seen::Text("still here".to_string())]);
        assert_eq!(stats.frames_received(), 6);
        assert_eq!(stats.decode_errors(), 3);
    }

    #[tokio::test]
    async fn transport_fault_ends_the_stream_once() {
        let (result, _, recorder) = run(vec![
            text("partial", Role::Assistant),
            Err(StreamError::Transport("connection reset".to_string())),
            text("never seen", Role::Assistant),
        ])
        .await;

        assert!(matches!(result, Err(StreamError::Transport(_))));
        let seen = recorder.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Seen::Text("partial".to_string()));
        assert!(matches!(&seen[1], Seen::Error(message) if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn call_closed_before_completion_end_is_a_transport_fault() {
        let (result, _, recorder) = run(vec![text("partial", Role::Assistant)]).await;

        assert!(matches!(result, Err(StreamError::Transport(_))));
        let seen = recorder.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Seen::Text("partial".to_string()));
        assert!(matches!(&seen[1], Seen::Error(message) if message.contains("completionEnd")));
    }

    #[tokio::test]
    async fn call_closed_after_stop_ends_cleanly() {
        let (recorder, _tool_uses) = Recorder::new();
        let transport = ScriptedTransport::until_body_ends(Vec::new());
        let session = started_session();
        let handle = StreamClient::new(transport)
            .start_stream(Arc::clone(&session), recorder.clone())
            .await
            .unwrap();

        session.stop().await;
        handle.join().await.unwrap();
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn model_errors_are_fatal() {
        let (result, _, recorder) = run(vec![frame(InboundEvent::Error(ModelError::new(
            "throttled",
        )))])
        .await;

        assert!(matches!(result, Err(StreamError::Model(message)) if message == "throttled"));
        assert_eq!(recorder.seen().len(), 1);
    }

    #[tokio::test]
    async fn barge_in_is_reported_instead_of_text() {
        let (result, stats, recorder) = run(vec![
            text(r#"{ "interrupted" : true }"#, Role::Assistant),
            completion_end(),
        ])
        .await;

        result.unwrap();
        assert_eq!(recorder.seen(), vec![Seen::Interrupted]);
        assert_eq!(stats.text_forwarded(), 0);
    }

    #[tokio::test]
    async fn tool_uses_are_handed_off() {
        let (recorder, mut tool_uses) = Recorder::new();
        let client = StreamClient::new(ScriptedTransport::new(vec![
            frame(InboundEvent::ToolUse(ToolUse::new(
                "t1",
                "query_documents",
                json!("{\"query\":\"revenue\"}"),
            ))),
            completion_end(),
        ]));
        let handle = client.start_stream(started_session(), recorder).await.unwrap();
        handle.join().await.unwrap();

        let tool_use = tokio::time::timeout(Duration::from_secs(1), tool_uses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tool_use.tool_use_id(), "t1");
        assert_eq!(tool_use.tool_name(), "query_documents");
    }

    #[tokio::test]
    async fn session_events_are_the_request_body() {
        let (recorder, _tool_uses) = Recorder::new();
        let transport = ScriptedTransport::until_body_ends(Vec::new());
        let session = started_session();
        let client = StreamClient::new(transport.clone());
        let handle = client
            .start_stream(Arc::clone(&session), recorder)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);

        session.stop().await;
        handle.join().await.unwrap();

        let names = transport.sent_names();
        assert_eq!(names.first(), Some(&"sessionStart"));
        assert_eq!(names.last(), Some(&"sessionEnd"));
        assert_eq!(names.len(), 9);
    }

    #[tokio::test]
    async fn handshake_that_never_goes_out_times_out() {
        let (recorder, _tool_uses) = Recorder::new();
        let transport = Arc::new(StalledTransport {
            body: Mutex::new(None),
        });
        let client = StreamClient::new(transport).with_handshake_timeout(Duration::from_millis(20));
        let result = client.start_stream(started_session(), recorder).await;
        assert!(matches!(
            result,
            Err(StreamError::Session(docchat_core::SessionError::HandshakeTimeout(_)))
        ));
    }
}
