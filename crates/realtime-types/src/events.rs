pub mod inbound;
pub mod outbound;

use inbound::InboundEvent;
use outbound::OutboundEvent;
use serde_json::{Map, Value};

/// Every frame on the duplex call is `{"event": {"<eventName>": {...}}}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope<E> {
    pub event: E,
}

impl<E> Envelope<E> {
    pub fn new(event: E) -> Self {
        Self { event }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Audio,
    Tool,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not a valid event envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("envelope must carry exactly one event, found {0}")]
    EventCount(usize),
    #[error("malformed `{name}` payload: {source}")]
    Payload {
        name: String,
        source: serde_json::Error,
    },
}

pub fn encode_event(event: &OutboundEvent) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope::new(event))
}

pub fn decode_outbound(text: &str) -> serde_json::Result<OutboundEvent> {
    serde_json::from_str::<Envelope<OutboundEvent>>(text).map(|frame| frame.event)
}

/// Decodes one inbound frame.
///
/// Returns `Ok(None)` for well-formed frames whose event name this crate does
/// not model (`completionStart`, `usageEvent`, ...), so callers can skip them
/// without treating them as decode faults.
pub fn decode_inbound(text: &str) -> Result<Option<InboundEvent>, DecodeError> {
    let frame: Envelope<Map<String, Value>> = serde_json::from_str(text)?;
    if frame.event.len() != 1 {
        return Err(DecodeError::EventCount(frame.event.len()));
    }
    let name = match frame.event.keys().next() {
        Some(name) => name.clone(),
        None => return Err(DecodeError::EventCount(0)),
    };
    if !InboundEvent::NAMES.contains(&name.as_str()) {
        return Ok(None);
    }
    serde_json::from_value(Value::Object(frame.event))
        .map(Some)
        .map_err(|source| DecodeError::Payload { name, source })
}
