//! The per-conversation session engine.
//!
//! A [`SessionEngine`] owns the only outbound event sequence of one duplex
//! model call. Three producers feed it at their own pace: microphone audio
//! ([`SessionEngine::enqueue_audio`]), tool results
//! ([`SessionEngine::enqueue_tool_result`]) and lifecycle control
//! ([`SessionEngine::start`], [`SessionEngine::stop`]). The transport pulls the
//! merged sequence from [`SessionEngine::generate_events`].
//!
//! Ordering guarantees:
//! * tool results are yielded before any audio or control event queued ahead
//!   of them;
//! * audio frames keep their arrival order;
//! * the audio content start precedes every audio frame;
//! * at most one teardown triple (content end, prompt end, session end) is
//!   ever queued.

use crate::error::SessionError;
use crate::queue::{Admission, BackpressurePolicy, EventQueues};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};
use docchat_realtime_types::audio::{AudioInputConfiguration, AudioOutputConfiguration, encode_pcm};
use docchat_realtime_types::events::outbound::{
    AudioInputEvent, ContentEndEvent, ContentStartEvent, InferenceConfiguration, PromptEndEvent,
    PromptStartEvent, SessionEndEvent, SessionStartEvent, TextInputEvent, ToolResultEvent,
};
use docchat_realtime_types::tools::ToolStatus;
use docchat_realtime_types::{OutboundEvent, Role};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant that answers questions about \
the user's uploaded documents. Keep answers short and conversational, as they are spoken aloud. \
Use the query_documents tool whenever the answer may be in the documents, and say so when it is not.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Draining,
    Stopped,
}

/// Knobs shared by every session of a process.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub system_prompt: String,
    pub inference: InferenceConfiguration,
    /// Upper bound on queued, not yet yielded audio frames.
    pub max_queued_audio: usize,
    pub backpressure: BackpressurePolicy,
    /// How long `stop` waits for the teardown events to be pulled.
    pub stop_grace: Duration,
    pub tool_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            inference: InferenceConfiguration::default(),
            max_queued_audio: 500,
            backpressure: BackpressurePolicy::DropOldest,
            stop_grace: Duration::from_secs(2),
            tool_timeout: Duration::from_secs(10),
        }
    }
}

/// What the client asked for when it started the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct StartConfig {
    pub voice_id: String,
    pub doc_scope: Option<String>,
}

/// One frame of PCM16LE mono microphone audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pcm: Vec<u8>,
}

impl AudioChunk {
    pub fn new(pcm: Vec<u8>) -> Self {
        Self { pcm }
    }

    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(pcm: Vec<u8>) -> Self {
        Self::new(pcm)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SessionStats {
    pub audio_queued: u64,
    pub audio_dropped: u64,
    pub tool_results: u64,
    pub events_yielded: u64,
}

struct Inner {
    state: SessionState,
    ready: bool,
    start: Option<StartConfig>,
    queues: EventQueues,
    generator_taken: bool,
    teardown_queued: bool,
    prompt_closed: bool,
    teardown_flushed: bool,
    teardown_fault_reported: bool,
    stats: SessionStats,
}

/// What became of the teardown after `stop` queued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Pending,
    Flushed,
    /// The event stream was dropped; nothing will pull the teardown.
    Abandoned,
}

enum Pull {
    Yield(OutboundEvent),
    Fail(SessionError),
    Finished,
    Wait,
}

pub struct SessionEngine {
    id: String,
    prompt_name: String,
    audio_content_name: String,
    settings: SessionSettings,
    tools: Arc<ToolRegistry>,
    inner: Mutex<Inner>,
    wakeup: Notify,
    state_tx: watch::Sender<SessionState>,
    drain_tx: watch::Sender<Drain>,
}

impl SessionEngine {
    pub fn new(settings: SessionSettings, tools: Arc<ToolRegistry>) -> Arc<Self> {
        let queues = EventQueues::new(settings.max_queued_audio, settings.backpressure);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            prompt_name: Uuid::new_v4().to_string(),
            audio_content_name: Uuid::new_v4().to_string(),
            settings,
            tools,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                ready: false,
                start: None,
                queues,
                generator_taken: false,
                teardown_queued: false,
                prompt_closed: false,
                teardown_flushed: false,
                teardown_fault_reported: false,
                stats: SessionStats::default(),
            }),
            wakeup: Notify::new(),
            state_tx: watch::Sender::new(SessionState::Idle),
            drain_tx: watch::Sender::new(Drain::Pending),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompt_name(&self) -> &str {
        &self.prompt_name
    }

    pub fn audio_content_name(&self) -> &str {
        &self.audio_content_name
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn doc_scope(&self) -> Option<String> {
        self.lock().start.as_ref().and_then(|start| start.doc_scope.clone())
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats.clone()
    }

    /// Number of events waiting to be pulled, tool events included.
    pub fn queued_len(&self) -> usize {
        self.lock().queues.len()
    }

    // A panic while holding the lock cannot leave the queues half-written, so
    // a poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        tracing::debug!(session = %self.id, "state {:?} -> {:?}", inner.state, state);
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    /// Queues the opening handshake: session start, prompt start, the system
    /// prompt as a text content, then the interactive audio content start.
    pub fn start(&self, config: StartConfig) -> Result<(), SessionError> {
        let system_content = Uuid::new_v4().to_string();
        let prompt_start = PromptStartEvent::new(
            &self.prompt_name,
            AudioOutputConfiguration::new(&config.voice_id),
            self.tools.tool_configuration(),
        );

        {
            let mut inner = self.lock();
            if inner.state != SessionState::Idle {
                return Err(SessionError::AlreadyStarted(inner.state));
            }
            self.set_state(&mut inner, SessionState::Starting);
            tracing::info!(
                session = %self.id,
                voice = %config.voice_id,
                scope = ?config.doc_scope,
                "starting session"
            );
            inner.start = Some(config);

            let queues = &mut inner.queues;
            queues.push_control(OutboundEvent::SessionStart(SessionStartEvent::new(
                self.settings.inference.clone(),
            )));
            queues.push_control(OutboundEvent::PromptStart(prompt_start));
            queues.push_control(OutboundEvent::ContentStart(ContentStartEvent::text(
                &self.prompt_name,
                &system_content,
                Role::System,
            )));
            queues.push_control(OutboundEvent::TextInput(TextInputEvent::new(
                &self.prompt_name,
                &system_content,
                &self.settings.system_prompt,
            )));
            queues.push_control(OutboundEvent::ContentEnd(ContentEndEvent::new(
                &self.prompt_name,
                &system_content,
            )));
            queues.push_control(OutboundEvent::ContentStart(ContentStartEvent::audio(
                &self.prompt_name,
                &self.audio_content_name,
                AudioInputConfiguration::default(),
            )));
            inner.ready = true;
        }
        self.wakeup.notify_one();
        Ok(())
    }

    /// Queues one microphone frame. Never blocks on the consumer.
    ///
    /// Frames arriving before the handshake is queued, or after `stop`, are
    /// dropped with a warning. `Err(QueueFull)` is only returned under
    /// [`BackpressurePolicy::Reject`].
    pub fn enqueue_audio(&self, chunk: AudioChunk) -> Result<(), SessionError> {
        let event = OutboundEvent::AudioInput(AudioInputEvent::new(
            &self.prompt_name,
            &self.audio_content_name,
            &encode_pcm(chunk.pcm()),
        ));

        {
            let mut inner = self.lock();
            let accepting = matches!(inner.state, SessionState::Starting | SessionState::Active);
            if !inner.ready || !accepting {
                inner.stats.audio_dropped += 1;
                tracing::warn!(
                    session = %self.id,
                    "dropping audio frame, session not ready (state {:?})",
                    inner.state
                );
                return Ok(());
            }
            match inner.queues.push_audio(event) {
                Admission::Queued => inner.stats.audio_queued += 1,
                Admission::DroppedOldest => {
                    inner.stats.audio_queued += 1;
                    inner.stats.audio_dropped += 1;
                    tracing::warn!(session = %self.id, "audio queue full, dropped oldest frame");
                }
                Admission::Rejected => {
                    inner.stats.audio_dropped += 1;
                    return Err(SessionError::QueueFull(self.settings.max_queued_audio));
                }
            }
        }
        self.wakeup.notify_one();
        Ok(())
    }

    /// Queues a tool result ahead of everything already waiting.
    pub fn enqueue_tool_result(&self, result: ToolResult) -> Result<(), SessionError> {
        let content_name = Uuid::new_v4().to_string();
        let status = result.is_error().then_some(ToolStatus::Error);
        let events = [
            OutboundEvent::ContentStart(ContentStartEvent::tool_result(
                &self.prompt_name,
                &content_name,
                result.tool_use_id(),
            )),
            OutboundEvent::ToolResult(ToolResultEvent::new(
                &self.prompt_name,
                &content_name,
                result.tool_use_id(),
                result.content(),
                status,
            )),
            OutboundEvent::ContentEnd(ContentEndEvent::new(&self.prompt_name, &content_name)),
        ];

        {
            let mut inner = self.lock();
            let open = matches!(
                inner.state,
                SessionState::Starting | SessionState::Active | SessionState::Draining
            );
            if !open || inner.prompt_closed {
                return Err(SessionError::Closed(inner.state));
            }
            inner.queues.push_tool(events);
            inner.stats.tool_results += 1;
        }
        self.wakeup.notify_one();
        Ok(())
    }

    /// Runs a tool call on its own task and queues whatever it produces.
    ///
    /// Returns immediately; the handle is only useful to callers that want to
    /// wait for the result to be queued.
    pub fn handle_tool_call(
        self: &Arc<Self>,
        tool_use_id: &str,
        tool_name: &str,
        input: Value,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let tool_use_id = tool_use_id.to_string();
        let tool_name = tool_name.to_string();
        let context = ToolContext {
            doc_scope: self.doc_scope(),
        };

        tokio::spawn(async move {
            tracing::info!(session = %engine.id, "tool call {} ({})", tool_name, tool_use_id);
            let result = engine
                .tools
                .dispatch(
                    &tool_use_id,
                    &tool_name,
                    input,
                    &context,
                    engine.settings.tool_timeout,
                )
                .await;
            if let Err(e) = engine.enqueue_tool_result(result) {
                tracing::warn!(
                    session = %engine.id,
                    "discarding result of tool call {}: {}",
                    tool_use_id,
                    e
                );
            }
        })
    }

    /// Hands out the outbound event sequence. It can be taken once per session.
    ///
    /// The stream ends right after the session end event has been yielded. If
    /// the session is stopped before that, it yields one
    /// [`SessionError::TeardownIncomplete`] and ends.
    pub fn generate_events(
        self: &Arc<Self>,
    ) -> Result<BoxStream<'static, Result<OutboundEvent, SessionError>>, SessionError> {
        {
            let mut inner = self.lock();
            if inner.generator_taken {
                return Err(SessionError::GeneratorTaken);
            }
            inner.generator_taken = true;
        }

        let consumer = Consumer(Arc::clone(self));
        Ok(stream::unfold(consumer, |consumer| async move {
            let item = consumer.0.next_event().await?;
            Some((item, consumer))
        })
        .boxed())
    }

    async fn next_event(&self) -> Option<Result<OutboundEvent, SessionError>> {
        loop {
            match self.pull() {
                Pull::Yield(event) => return Some(Ok(event)),
                Pull::Fail(e) => return Some(Err(e)),
                Pull::Finished => return None,
                // A notify_one issued while nobody waits leaves a permit behind,
                // so a push between pull() and here is never missed.
                Pull::Wait => self.wakeup.notified().await,
            }
        }
    }

    fn pull(&self) -> Pull {
        let mut inner = self.lock();
        if inner.teardown_flushed {
            return Pull::Finished;
        }

        if let Some(event) = inner.queues.pop() {
            inner.stats.events_yielded += 1;
            match &event {
                OutboundEvent::ContentStart(start)
                    if start.content_name() == self.audio_content_name
                        && inner.state == SessionState::Starting =>
                {
                    self.set_state(&mut inner, SessionState::Active);
                }
                OutboundEvent::PromptEnd(_) => inner.prompt_closed = true,
                OutboundEvent::SessionEnd(_) => {
                    inner.teardown_flushed = true;
                    self.drain_tx.send_replace(Drain::Flushed);
                }
                _ => {}
            }
            return Pull::Yield(event);
        }

        if inner.state == SessionState::Stopped {
            if inner.teardown_queued && !inner.teardown_fault_reported {
                inner.teardown_fault_reported = true;
                return Pull::Fail(SessionError::TeardownIncomplete);
            }
            return Pull::Finished;
        }
        Pull::Wait
    }

    /// Resolves once the audio content start has been pulled by the transport.
    pub async fn wait_active(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut state_rx = self.state_tx.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|state| !matches!(state, SessionState::Idle | SessionState::Starting)),
        )
        .await;
        let state = match waited {
            Ok(Ok(state)) => *state,
            Ok(Err(_)) => SessionState::Stopped,
            Err(_) => return Err(SessionError::HandshakeTimeout(timeout)),
        };
        match state {
            SessionState::Active => Ok(()),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Ends the conversation. Safe to call from any task, any number of times;
    /// only the first call queues the teardown triple.
    pub async fn stop(&self) {
        {
            let mut inner = self.lock();
            let state = inner.state;
            match state {
                SessionState::Stopped | SessionState::Draining => {
                    tracing::debug!(session = %self.id, "stop ignored in state {:?}", state);
                    return;
                }
                SessionState::Idle => {
                    inner.ready = false;
                    self.set_state(&mut inner, SessionState::Stopped);
                    drop(inner);
                    self.wakeup.notify_one();
                    return;
                }
                SessionState::Starting | SessionState::Active => {
                    inner.ready = false;
                    self.set_state(&mut inner, SessionState::Draining);
                    if !inner.teardown_queued {
                        inner.teardown_queued = true;
                        let queues = &mut inner.queues;
                        queues.push_control(OutboundEvent::ContentEnd(ContentEndEvent::new(
                            &self.prompt_name,
                            &self.audio_content_name,
                        )));
                        queues.push_control(OutboundEvent::PromptEnd(PromptEndEvent::new(
                            &self.prompt_name,
                        )));
                        queues.push_control(OutboundEvent::SessionEnd(SessionEndEvent {}));
                    }
                }
            }
        }
        self.wakeup.notify_one();

        tracing::info!(session = %self.id, "stopping session");
        let mut drain_rx = self.drain_tx.subscribe();
        let grace = self.settings.stop_grace;
        match tokio::time::timeout(grace, drain_rx.wait_for(|drain| *drain != Drain::Pending))
            .await
        {
            Ok(Ok(drain)) if *drain == Drain::Abandoned => {
                tracing::warn!(session = %self.id, "event stream dropped before teardown was flushed");
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(session = %self.id, "teardown not flushed within {:?}", grace);
            }
        }

        {
            let mut inner = self.lock();
            inner.queues.clear();
            self.set_state(&mut inner, SessionState::Stopped);
        }
        self.wakeup.notify_one();
        tracing::info!(session = %self.id, "session stopped");
    }
}

/// Keeps the engine alive for the consumer of `generate_events` and tells a
/// pending `stop` when that consumer goes away.
struct Consumer(Arc<SessionEngine>);

impl Drop for Consumer {
    fn drop(&mut self) {
        self.0.drain_tx.send_if_modified(|drain| {
            if *drain != Drain::Pending {
                return false;
            }
            *drain = Drain::Abandoned;
            true
        });
    }
}
