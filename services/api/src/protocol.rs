//! JSON messages exchanged with the browser over `/ws`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Start {
        voice_id: Option<String>,
        doc_scope: Option<String>,
    },
    /// Base64 PCM16LE, 16 kHz, mono.
    Audio { audio: String },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Ready,
    /// Base64 PCM16LE, 24 kHz, mono.
    Audio { data: String },
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    ContentEnd { stop_reason: Option<String> },
    Error { error: String },
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_client_messages() {
        let start: ClientMessage =
            serde_json::from_str(r#"{"type":"start","voiceId":"tiffany","docScope":"q3"}"#).unwrap();
        assert_eq!(
            start,
            ClientMessage::Start {
                voice_id: Some("tiffany".to_string()),
                doc_scope: Some("q3".to_string()),
            }
        );

        let bare: ClientMessage = serde_json::from_str(r#"{"type":"start"}"#).unwrap();
        assert_eq!(
            bare,
            ClientMessage::Start {
                voice_id: None,
                doc_scope: None,
            }
        );

        let stop: ClientMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(stop, ClientMessage::Stop);
    }

    #[test]
    fn rejects_unknown_and_incomplete_messages() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"pause"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"audio"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"audio":"AAA="}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged_by_type() {
        assert_eq!(serde_json::to_value(ServerMessage::Ready).unwrap(), json!({"type": "ready"}));
        assert_eq!(
            serde_json::to_value(ServerMessage::ContentEnd {
                stop_reason: Some("END_TURN".to_string())
            })
            .unwrap(),
            json!({"type": "contentEnd", "stopReason": "END_TURN"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Audio {
                data: "AAE=".to_string()
            })
            .unwrap(),
            json!({"type": "audio", "data": "AAE="})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Interrupted).unwrap(),
            json!({"type": "interrupted"})
        );
    }
}
