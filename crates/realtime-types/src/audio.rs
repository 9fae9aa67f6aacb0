use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Microphone audio accepted by the model: PCM16LE, mono, 16 kHz.
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;
/// Synthesized speech returned by the model: PCM16LE, mono, 24 kHz.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;
pub const SAMPLE_SIZE_BITS: u16 = 16;
pub const CHANNEL_COUNT: u16 = 1;

pub const LPCM_MEDIA_TYPE: &str = "audio/lpcm";
pub const BASE64_ENCODING: &str = "base64";
pub const SPEECH_AUDIO_TYPE: &str = "SPEECH";

/// Encodes raw PCM bytes for the wire.
pub fn encode_pcm(pcm: &[u8]) -> Base64EncodedAudioBytes {
    STANDARD.encode(pcm)
}

/// Decodes a wire audio payload back into raw PCM bytes.
pub fn decode_pcm(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

/// `audioInputConfiguration` carried by the audio content start.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputConfiguration {
    media_type: String,
    sample_rate_hertz: u32,
    sample_size_bits: u16,
    channel_count: u16,
    audio_type: String,
    encoding: String,
}

impl Default for AudioInputConfiguration {
    fn default() -> Self {
        Self {
            media_type: LPCM_MEDIA_TYPE.to_string(),
            sample_rate_hertz: INPUT_SAMPLE_RATE_HZ,
            sample_size_bits: SAMPLE_SIZE_BITS,
            channel_count: CHANNEL_COUNT,
            audio_type: SPEECH_AUDIO_TYPE.to_string(),
            encoding: BASE64_ENCODING.to_string(),
        }
    }
}

impl AudioInputConfiguration {
    pub fn sample_rate_hertz(&self) -> u32 {
        self.sample_rate_hertz
    }
}

/// `audioOutputConfiguration` carried by the prompt start.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputConfiguration {
    media_type: String,
    sample_rate_hertz: u32,
    sample_size_bits: u16,
    channel_count: u16,
    voice_id: String,
    encoding: String,
    audio_type: String,
}

impl AudioOutputConfiguration {
    pub fn new(voice_id: &str) -> Self {
        Self {
            media_type: LPCM_MEDIA_TYPE.to_string(),
            sample_rate_hertz: OUTPUT_SAMPLE_RATE_HZ,
            sample_size_bits: SAMPLE_SIZE_BITS,
            channel_count: CHANNEL_COUNT,
            voice_id: voice_id.to_string(),
            encoding: BASE64_ENCODING.to_string(),
            audio_type: SPEECH_AUDIO_TYPE.to_string(),
        }
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn sample_rate_hertz(&self) -> u32 {
        self.sample_rate_hertz
    }
}
