use crate::error::ToolError;
use async_trait::async_trait;
use docchat_realtime_types::tools::{Tool, ToolConfiguration, ToolStatus};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// The engine's answer to one `toolUse` from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    tool_use_id: String,
    content: String,
    status: ToolStatus,
}

impl ToolResult {
    pub fn success(tool_use_id: &str, content: &str) -> Self {
        Self {
            tool_use_id: tool_use_id.to_string(),
            content: content.to_string(),
            status: ToolStatus::Success,
        }
    }

    /// The model receives the failure as a small JSON document.
    pub fn error(tool_use_id: &str, error: &ToolError) -> Self {
        Self {
            tool_use_id: tool_use_id.to_string(),
            content: serde_json::json!({ "error": error.to_string() }).to_string(),
            status: ToolStatus::Error,
        }
    }

    pub fn tool_use_id(&self) -> &str {
        &self.tool_use_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> ToolStatus {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Per-session facts a tool may need.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub doc_scope: Option<String>,
}

/// One capability the model may invoke by name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Advertised to the model in the prompt start.
    fn spec(&self) -> Tool;

    async fn call(&self, input: Value, context: &ToolContext) -> Result<String, ToolError>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(handler.spec().name().to_string(), handler);
        self
    }

    pub fn tool_configuration(&self) -> ToolConfiguration {
        ToolConfiguration::new(self.handlers.values().map(|handler| handler.spec()).collect())
    }

    /// Runs one tool call to completion. Every failure, including the timeout,
    /// is folded into an error-flagged result.
    pub async fn dispatch(
        &self,
        tool_use_id: &str,
        tool_name: &str,
        input: Value,
        context: &ToolContext,
        timeout: Duration,
    ) -> ToolResult {
        match self.try_dispatch(tool_name, input, context, timeout).await {
            Ok(content) => {
                tracing::debug!("tool {} ({}) succeeded", tool_name, tool_use_id);
                ToolResult::success(tool_use_id, &content)
            }
            Err(e) => {
                tracing::warn!("tool {} ({}) failed: {}", tool_name, tool_use_id, e);
                ToolResult::error(tool_use_id, &e)
            }
        }
    }

    async fn try_dispatch(
        &self,
        tool_name: &str,
        input: Value,
        context: &ToolContext,
        timeout: Duration,
    ) -> Result<String, ToolError> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        let input = normalize_input(input)?;
        tokio::time::timeout(timeout, handler.call(input, context))
            .await
            .map_err(|_| ToolError::Timeout(timeout))?
    }
}

/// The model sends arguments as a JSON document serialized into a string.
fn normalize_input(input: Value) -> Result<Value, ToolError> {
    match input {
        Value::String(raw) => serde_json::from_str::<Value>(&raw)
            .map_err(|e| ToolError::MalformedInput(e.to_string()))
            .and_then(normalize_input),
        Value::Object(_) => Ok(input),
        Value::Null => Ok(Value::Object(Default::default())),
        other => Err(ToolError::MalformedInput(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
