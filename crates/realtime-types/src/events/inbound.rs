use crate::audio::Base64EncodedAudioBytes;
use crate::events::{ContentType, Role};
use serde_json::Value;

/// Events received from the model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InboundEvent {
    ContentStart(ContentStartOutput),
    TextOutput(TextOutput),
    AudioOutput(AudioOutput),
    ToolUse(ToolUse),
    ContentEnd(ContentEndOutput),
    CompletionEnd(CompletionEnd),
    Error(ModelError),
}

impl InboundEvent {
    pub const NAMES: &'static [&'static str] = &[
        "contentStart",
        "textOutput",
        "audioOutput",
        "toolUse",
        "contentEnd",
        "completionEnd",
        "error",
    ];
}

/// Whether assistant text is a discardable preview or the deliverable answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStage {
    Speculative,
    #[default]
    Final,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdditionalModelFields {
    generation_stage: Option<GenerationStage>,
}

/// `contentStart` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStartOutput {
    #[serde(default)]
    role: Option<Role>,
    #[serde(rename = "type", default)]
    content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_id: Option<String>,
    /// JSON document serialized into a string, e.g. `{"generationStage":"FINAL"}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_model_fields: Option<String>,
}

impl ContentStartOutput {
    pub fn new(role: Role, content_type: ContentType) -> Self {
        Self {
            role: Some(role),
            content_type: Some(content_type),
            content_id: None,
            additional_model_fields: None,
        }
    }

    pub fn with_generation_stage(mut self, stage: GenerationStage) -> Self {
        let stage = match stage {
            GenerationStage::Speculative => "SPECULATIVE",
            GenerationStage::Final => "FINAL",
        };
        self.additional_model_fields = Some(format!("{{\"generationStage\":\"{stage}\"}}"));
        self
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Missing or unparseable metadata counts as `Final`.
    pub fn generation_stage(&self) -> GenerationStage {
        self.additional_model_fields
            .as_deref()
            .and_then(|fields| serde_json::from_str::<AdditionalModelFields>(fields).ok())
            .and_then(|fields| fields.generation_stage)
            .unwrap_or_default()
    }
}

/// `textOutput` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOutput {
    content: String,
    role: Role,
}

impl TextOutput {
    pub fn new(content: &str, role: Role) -> Self {
        Self {
            content: content.to_string(),
            role,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Barge-in: the model embeds `{ "interrupted" : true }` in the text stream
    /// when the user talks over the assistant.
    pub fn is_interruption(&self) -> bool {
        serde_json::from_str::<Value>(self.content.trim())
            .ok()
            .and_then(|value| value.get("interrupted").and_then(Value::as_bool))
            .unwrap_or(false)
    }
}

/// `audioOutput` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutput {
    content: Base64EncodedAudioBytes,
}

impl AudioOutput {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    pub fn content(&self) -> &Base64EncodedAudioBytes {
        &self.content
    }
}

/// `toolUse` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    tool_use_id: String,
    tool_name: String,
    /// The arguments; the model sends a JSON document serialized into a string.
    #[serde(alias = "input", default)]
    content: Value,
}

impl ToolUse {
    pub fn new(tool_use_id: &str, tool_name: &str, content: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.to_string(),
            tool_name: tool_name.to_string(),
            content,
        }
    }

    pub fn tool_use_id(&self) -> &str {
        &self.tool_use_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn input(&self) -> &Value {
        &self.content
    }
}

/// `contentEnd` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEndOutput {
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    content_type: Option<ContentType>,
}

impl ContentEndOutput {
    pub fn new(stop_reason: &str) -> Self {
        Self {
            stop_reason: Some(stop_reason.to_string()),
            content_type: None,
        }
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }
}

/// `completionEnd` event
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

impl CompletionEnd {
    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }
}

/// A failure reported by the model inside the stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelError {
    message: String,
}

impl ModelError {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
