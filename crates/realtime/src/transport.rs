//! The duplex call underneath a stream.
//!
//! A transport takes the whole outbound sequence as its request body and
//! returns the inbound frames. Both directions run at the same time.

use crate::client::{Config, build_request};
use crate::error::StreamError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use futures_util::SinkExt;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

/// Encoded outbound frames. An `Err` item aborts the call.
pub type OutboundBody = BoxStream<'static, Result<String, StreamError>>;
/// Raw inbound frames. A transport fault is delivered as a final `Err` item.
pub type InboundFrames = BoxStream<'static, Result<String, StreamError>>;

#[async_trait]
pub trait DuplexTransport: Send + Sync {
    /// Opens the call. Must return as soon as the call is established, without
    /// waiting for the body to finish.
    async fn open(&self, body: OutboundBody) -> Result<InboundFrames, StreamError>;
}

/// One WebSocket connection per call; a text message per event.
pub struct WebSocketTransport {
    config: Arc<Config>,
}

impl WebSocketTransport {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl DuplexTransport for WebSocketTransport {
    async fn open(&self, mut body: OutboundBody) -> Result<InboundFrames, StreamError> {
        // Create a request using the build_request function.
        let request =
            build_request(&self.config).map_err(|e| StreamError::Request(e.to_string()))?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("connected to model stream at {}", self.config.base_url());

        // Split the WebSocket into read and write halves so both directions
        // make progress independently.
        let (mut write, mut read) = ws_stream.split();
        let (frame_tx, frame_rx) = tokio::sync::mpsc::channel(self.config.capacity());

        // This task drains the request body into the socket.
        let fault_tx = frame_tx.clone();
        tokio::spawn(async move {
            while let Some(item) = body.next().await {
                match item {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            let _ = fault_tx.send(Err(StreamError::from(e))).await;
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("aborting call, outbound body failed: {}", e);
                        let _ = fault_tx.send(Err(e)).await;
                        let _ = write.close().await;
                        return;
                    }
                }
            }
            tracing::debug!("request body finished, closing write half");
            if let Err(e) = write.close().await {
                tracing::warn!("failed to close write half: {}", e);
            }
        });

        // This task forwards every inbound text frame until the call ends.
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = frame_tx.send(Err(StreamError::from(e))).await;
                        break;
                    }
                    Ok(message) => message,
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Binary(bin) => match String::from_utf8(bin) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("unexpected non-utf8 binary message: {}", e);
                            continue;
                        }
                    },
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => continue,
                };
                if frame_tx.send(Ok(text)).await.is_err() {
                    tracing::debug!("inbound frames dropped by the consumer");
                    break;
                }
            }
        });

        Ok(stream::unfold(frame_rx, |mut rx| async move {
            let frame = rx.recv().await?;
            Some((frame, rx))
        })
        .boxed())
    }
}
