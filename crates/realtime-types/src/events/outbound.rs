use crate::audio::{AudioInputConfiguration, AudioOutputConfiguration, Base64EncodedAudioBytes};
use crate::events::{ContentType, Role};
use crate::tools::{JSON_MEDIA_TYPE, ToolConfiguration, ToolStatus};

pub const TEXT_MEDIA_TYPE: &str = "text/plain";

/// Events sent to the model, in the order the session engine yields them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundEvent {
    SessionStart(SessionStartEvent),
    PromptStart(PromptStartEvent),
    ContentStart(ContentStartEvent),
    TextInput(TextInputEvent),
    AudioInput(AudioInputEvent),
    ToolResult(ToolResultEvent),
    ContentEnd(ContentEndEvent),
    PromptEnd(PromptEndEvent),
    SessionEnd(SessionEndEvent),
}

impl OutboundEvent {
    /// The wire name, as it appears as the single key of the envelope.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SessionStart(_) => "sessionStart",
            OutboundEvent::PromptStart(_) => "promptStart",
            OutboundEvent::ContentStart(_) => "contentStart",
            OutboundEvent::TextInput(_) => "textInput",
            OutboundEvent::AudioInput(_) => "audioInput",
            OutboundEvent::ToolResult(_) => "toolResult",
            OutboundEvent::ContentEnd(_) => "contentEnd",
            OutboundEvent::PromptEnd(_) => "promptEnd",
            OutboundEvent::SessionEnd(_) => "sessionEnd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
    max_tokens: u32,
    top_p: f32,
    temperature: f32,
}

impl Default for InferenceConfiguration {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            top_p: 0.9,
            temperature: 0.7,
        }
    }
}

impl InferenceConfiguration {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

/// `sessionStart` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartEvent {
    inference_configuration: InferenceConfiguration,
}

impl SessionStartEvent {
    pub fn new(inference_configuration: InferenceConfiguration) -> Self {
        Self {
            inference_configuration,
        }
    }

    pub fn inference_configuration(&self) -> &InferenceConfiguration {
        &self.inference_configuration
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfiguration {
    media_type: String,
}

impl MediaConfiguration {
    pub fn new(media_type: &str) -> Self {
        Self {
            media_type: media_type.to_string(),
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

/// `promptStart` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStartEvent {
    prompt_name: String,
    text_output_configuration: MediaConfiguration,
    audio_output_configuration: AudioOutputConfiguration,
    tool_use_output_configuration: MediaConfiguration,
    tool_configuration: ToolConfiguration,
}

impl PromptStartEvent {
    pub fn new(
        prompt_name: &str,
        audio_output_configuration: AudioOutputConfiguration,
        tool_configuration: ToolConfiguration,
    ) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            text_output_configuration: MediaConfiguration::new(TEXT_MEDIA_TYPE),
            audio_output_configuration,
            tool_use_output_configuration: MediaConfiguration::new(JSON_MEDIA_TYPE),
            tool_configuration,
        }
    }

    pub fn prompt_name(&self) -> &str {
        &self.prompt_name
    }

    pub fn audio_output_configuration(&self) -> &AudioOutputConfiguration {
        &self.audio_output_configuration
    }

    pub fn tool_configuration(&self) -> &ToolConfiguration {
        &self.tool_configuration
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultInputConfiguration {
    tool_use_id: String,
    #[serde(rename = "type")]
    content_type: ContentType,
    text_input_configuration: MediaConfiguration,
}

/// `contentStart` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStartEvent {
    prompt_name: String,
    content_name: String,
    #[serde(rename = "type")]
    content_type: ContentType,
    interactive: bool,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_input_configuration: Option<MediaConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_input_configuration: Option<AudioInputConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_result_input_configuration: Option<ToolResultInputConfiguration>,
}

impl ContentStartEvent {
    /// A non-interactive text block, e.g. the system prompt.
    pub fn text(prompt_name: &str, content_name: &str, role: Role) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Text,
            interactive: false,
            role,
            text_input_configuration: Some(MediaConfiguration::new(TEXT_MEDIA_TYPE)),
            audio_input_configuration: None,
            tool_result_input_configuration: None,
        }
    }

    /// The interactive microphone stream; one per session.
    pub fn audio(
        prompt_name: &str,
        content_name: &str,
        audio_input_configuration: AudioInputConfiguration,
    ) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Audio,
            interactive: true,
            role: Role::User,
            text_input_configuration: None,
            audio_input_configuration: Some(audio_input_configuration),
            tool_result_input_configuration: None,
        }
    }

    pub fn tool_result(prompt_name: &str, content_name: &str, tool_use_id: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Tool,
            interactive: false,
            role: Role::Tool,
            text_input_configuration: None,
            audio_input_configuration: None,
            tool_result_input_configuration: Some(ToolResultInputConfiguration {
                tool_use_id: tool_use_id.to_string(),
                content_type: ContentType::Text,
                text_input_configuration: MediaConfiguration::new(TEXT_MEDIA_TYPE),
            }),
        }
    }

    pub fn prompt_name(&self) -> &str {
        &self.prompt_name
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }
}

/// `textInput` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInputEvent {
    prompt_name: String,
    content_name: String,
    content: String,
}

impl TextInputEvent {
    pub fn new(prompt_name: &str, content_name: &str, content: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content: content.to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// `audioInput` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputEvent {
    prompt_name: String,
    content_name: String,
    content: Base64EncodedAudioBytes,
}

impl AudioInputEvent {
    pub fn new(prompt_name: &str, content_name: &str, content: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content: content.to_string(),
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn content(&self) -> &Base64EncodedAudioBytes {
        &self.content
    }
}

/// `toolResult` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    prompt_name: String,
    content_name: String,
    tool_use_id: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ToolStatus>,
}

impl ToolResultEvent {
    pub fn new(
        prompt_name: &str,
        content_name: &str,
        tool_use_id: &str,
        content: &str,
        status: Option<ToolStatus>,
    ) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            tool_use_id: tool_use_id.to_string(),
            content: content.to_string(),
            status,
        }
    }

    pub fn tool_use_id(&self) -> &str {
        &self.tool_use_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> Option<ToolStatus> {
        self.status
    }
}

/// `contentEnd` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEndEvent {
    prompt_name: String,
    content_name: String,
}

impl ContentEndEvent {
    pub fn new(prompt_name: &str, content_name: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }
}

/// `promptEnd` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEndEvent {
    prompt_name: String,
}

impl PromptEndEvent {
    pub fn new(prompt_name: &str) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
        }
    }

    pub fn prompt_name(&self) -> &str {
        &self.prompt_name
    }
}

/// `sessionEnd` event
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionEndEvent {}
