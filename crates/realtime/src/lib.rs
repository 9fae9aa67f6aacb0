mod client;
mod error;
pub mod transport;

pub use client::{Config, ConfigBuilder, ResponseHandler, Stats, StreamClient, StreamHandle};
pub use docchat_realtime_types as types;
pub use error::StreamError;
pub use transport::{DuplexTransport, WebSocketTransport};
