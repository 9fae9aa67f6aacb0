use crate::session::SessionState;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already started (state {0:?})")]
    AlreadyStarted(SessionState),
    #[error("session is not accepting events (state {0:?})")]
    Closed(SessionState),
    #[error("audio queue is full ({0} frames), frame rejected")]
    QueueFull(usize),
    #[error("the outbound event stream has already been taken")]
    GeneratorTaken,
    #[error("session stopped before the teardown sequence was sent")]
    TeardownIncomplete,
    #[error("session did not become active within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("session ended before becoming active (state {0:?})")]
    NotActive(SessionState),
}

/// Failures of a single tool invocation. These never end the session; they are
/// reported back to the model as an error-flagged tool result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("malformed tool input: {0}")]
    MalformedInput(String),
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),
    #[error("knowledge lookup failed: {0}")]
    Lookup(String),
}
