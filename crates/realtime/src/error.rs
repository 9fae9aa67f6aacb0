use docchat_core::SessionError;

/// Failures that end a stream. Everything recoverable (a single bad frame, a
/// failed tool call) is handled inside the loop and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("transport fault: {0}")]
    Transport(String),
    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("event generation failed: {0}")]
    Session(#[from] SessionError),
    #[error("model reported an error: {0}")]
    Model(String),
    #[error("failed to build request: {0}")]
    Request(String),
    #[error("response loop did not finish: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(e.to_string())
    }
}
