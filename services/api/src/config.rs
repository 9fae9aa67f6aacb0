use docchat_core::session::DEFAULT_SYSTEM_PROMPT;
use docchat_core::types::events::outbound::InferenceConfiguration;
use docchat_core::{BackpressurePolicy, SessionSettings};
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub model_stream_url: String,
    pub model_id: String,
    pub model_api_key: Option<String>,
    pub default_voice_id: String,
    pub system_prompt: String,
    pub inference: InferenceConfiguration,
    pub knowledge_base_url: String,
    pub kb_top_k: usize,
    pub kb_excerpt_chars: usize,
    pub tool_timeout: Duration,
    pub stop_grace: Duration,
    pub handshake_timeout: Duration,
    pub max_queued_audio: usize,
    pub backpressure: BackpressurePolicy,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `MODEL_STREAM_URL`: Base URL of the duplex model endpoint. Defaults to "ws://127.0.0.1:8081/v1".
    /// *   `MODEL_ID`: (Optional) Defaults to "amazon.nova-sonic-v1:0".
    /// *   `MODEL_API_KEY`: (Optional) Sent as a bearer token when present.
    /// *   `DEFAULT_VOICE_ID`: (Optional) Voice used when "start" names none. Defaults to "matthew".
    /// *   `SYSTEM_PROMPT`: (Optional) Replaces the built-in system prompt.
    /// *   `MAX_TOKENS`, `TOP_P`, `TEMPERATURE`: (Optional) Sampling settings. Default 1024, 0.9, 0.7.
    /// *   `KNOWLEDGE_BASE_URL`: Base URL of the document retrieval service. Required.
    /// *   `KB_TOP_K`, `KB_EXCERPT_CHARS`: (Optional) Excerpt count and length. Default 3 and 1000.
    /// *   `TOOL_TIMEOUT_MS`, `STOP_GRACE_MS`, `HANDSHAKE_TIMEOUT_MS`: (Optional) Default 10000, 2000, 5000.
    /// *   `MAX_QUEUED_AUDIO`: (Optional) Audio frames buffered per session. Defaults to 500.
    /// *   `BACKPRESSURE_POLICY`: (Optional) "drop-oldest" or "reject". Defaults to "drop-oldest".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let model_stream_url = lookup("MODEL_STREAM_URL")
            .unwrap_or_else(|| "ws://127.0.0.1:8081/v1".to_string());
        let model_id = lookup("MODEL_ID").unwrap_or_else(|| "amazon.nova-sonic-v1:0".to_string());
        let model_api_key = lookup("MODEL_API_KEY").filter(|key| !key.is_empty());
        let default_voice_id = lookup("DEFAULT_VOICE_ID").unwrap_or_else(|| "matthew".to_string());
        let system_prompt =
            lookup("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let defaults = InferenceConfiguration::default();
        let top_p = parse_or(&lookup, "TOP_P", defaults.top_p())?;
        if !(0.0..=1.0).contains(&top_p) {
            return Err(ConfigError::InvalidValue(
                "TOP_P".to_string(),
                "must be between 0 and 1".to_string(),
            ));
        }
        let temperature = parse_or(&lookup, "TEMPERATURE", defaults.temperature())?;
        if temperature < 0.0 {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                "must not be negative".to_string(),
            ));
        }
        let inference = defaults
            .clone()
            .with_max_tokens(parse_or(&lookup, "MAX_TOKENS", defaults.max_tokens())?)
            .with_top_p(top_p)
            .with_temperature(temperature);

        let knowledge_base_url = lookup("KNOWLEDGE_BASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("KNOWLEDGE_BASE_URL".to_string()))?;
        let kb_top_k = parse_or(&lookup, "KB_TOP_K", 3usize)?;
        let kb_excerpt_chars = parse_or(&lookup, "KB_EXCERPT_CHARS", 1000usize)?;

        let tool_timeout = Duration::from_millis(parse_or(&lookup, "TOOL_TIMEOUT_MS", 10_000u64)?);
        let stop_grace = Duration::from_millis(parse_or(&lookup, "STOP_GRACE_MS", 2_000u64)?);
        let handshake_timeout =
            Duration::from_millis(parse_or(&lookup, "HANDSHAKE_TIMEOUT_MS", 5_000u64)?);

        let max_queued_audio = parse_or(&lookup, "MAX_QUEUED_AUDIO", 500usize)?;
        if max_queued_audio == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_QUEUED_AUDIO".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backpressure =
            parse_or(&lookup, "BACKPRESSURE_POLICY", BackpressurePolicy::DropOldest)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            model_stream_url,
            model_id,
            model_api_key,
            default_voice_id,
            system_prompt,
            inference,
            knowledge_base_url,
            kb_top_k,
            kb_excerpt_chars,
            tool_timeout,
            stop_grace,
            handshake_timeout,
            max_queued_audio,
            backpressure,
            log_level,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            system_prompt: self.system_prompt.clone(),
            inference: self.inference.clone(),
            max_queued_audio: self.max_queued_audio,
            backpressure: self.backpressure,
            stop_grace: self.stop_grace,
            tool_timeout: self.tool_timeout,
            ..SessionSettings::default()
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_knowledge_base_is_set() {
        let config = load(&[("KNOWLEDGE_BASE_URL", "http://kb.local")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.model_id, "amazon.nova-sonic-v1:0");
        assert!(config.model_api_key.is_none());
        assert_eq!(config.default_voice_id, "matthew");
        assert_eq!(config.kb_top_k, 3);
        assert_eq!(config.backpressure, BackpressurePolicy::DropOldest);
        assert_eq!(config.log_level, Level::INFO);

        let settings = config.session_settings();
        assert_eq!(settings.tool_timeout, Duration::from_secs(10));
        assert_eq!(settings.stop_grace, Duration::from_secs(2));
        assert_eq!(settings.max_queued_audio, 500);
        assert_eq!(settings.inference, InferenceConfiguration::default());
    }

    #[test]
    fn sampling_settings_reach_the_session() {
        let config = load(&[
            ("KNOWLEDGE_BASE_URL", "http://kb.local"),
            ("MAX_TOKENS", "2048"),
            ("TOP_P", "0.5"),
            ("TEMPERATURE", "0.2"),
        ])
        .unwrap();
        let inference = config.session_settings().inference;
        assert_eq!(inference.max_tokens(), 2048);
        assert_eq!(inference.top_p(), 0.5);
        assert_eq!(inference.temperature(), 0.2);

        let err = load(&[("KNOWLEDGE_BASE_URL", "http://kb.local"), ("TOP_P", "1.5")])
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "TOP_P"));
    }

    #[test]
    fn knowledge_base_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(name)) if name == "KNOWLEDGE_BASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("KNOWLEDGE_BASE_URL", "http://kb.local"),
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("MODEL_API_KEY", "secret"),
            ("KB_TOP_K", "5"),
            ("STOP_GRACE_MS", "250"),
            ("BACKPRESSURE_POLICY", "reject"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.model_api_key.as_deref(), Some("secret"));
        assert_eq!(config.kb_top_k, 5);
        assert_eq!(config.stop_grace, Duration::from_millis(250));
        assert_eq!(config.backpressure, BackpressurePolicy::Reject);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = load(&[("KNOWLEDGE_BASE_URL", "http://kb.local"), ("KB_TOP_K", "many")])
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "KB_TOP_K"));

        let err = load(&[
            ("KNOWLEDGE_BASE_URL", "http://kb.local"),
            ("BACKPRESSURE_POLICY", "block"),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "BACKPRESSURE_POLICY"));
    }
}
