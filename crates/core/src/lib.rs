pub mod error;
pub mod knowledge;
pub mod queue;
pub mod session;
pub mod tools;

pub use docchat_realtime_types as types;
pub use error::{SessionError, ToolError};
pub use queue::BackpressurePolicy;
pub use session::{AudioChunk, SessionEngine, SessionSettings, SessionState, SessionStats, StartConfig};
pub use tools::{ToolContext, ToolHandler, ToolRegistry, ToolResult};
