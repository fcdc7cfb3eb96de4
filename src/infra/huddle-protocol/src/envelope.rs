use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DecodeError, Negotiation};

/// Client → server message, sent as a JSON text WebSocket frame.
///
/// Discriminated by `type`:
/// - `presence`: declare the sender's peer identifier
/// - `chat`: submit a user turn to the completion backend
/// - `clear`: reset the session transcript
/// - `video-started` / `video-stopped`: media state change, broadcast
/// - `webrtc-offer` / `webrtc-answer` / `webrtc-ice`: directed negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Presence(Presence),
    Chat(ChatRequest),
    Clear,
    VideoStarted(Negotiation),
    VideoStopped(Negotiation),
    WebrtcOffer(Negotiation),
    WebrtcAnswer(Negotiation),
    WebrtcIce(Negotiation),
}

impl ClientMessage {
    /// Every `type` value the server understands.
    pub const KINDS: &'static [&'static str] = &[
        "presence",
        "chat",
        "clear",
        "video-started",
        "video-stopped",
        "webrtc-offer",
        "webrtc-answer",
        "webrtc-ice",
    ];
}

/// Payload of a `presence` announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub peer_id: String,
}

/// Payload of a `chat` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Free-text user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Model to switch the session to before this request is issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Attached files, in the order the user attached them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
}

/// A file attached to a chat request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    /// Declared media type (e.g. `image/png`).
    #[serde(rename = "type", default)]
    pub media_type: String,
    /// Payload as a data URI (`data:<type>;base64,<payload>`) or bare base64.
    #[serde(default)]
    pub data: String,
}

/// Server → client message, sent as a JSON text WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        message: String,
        model: String,
    },
    Ack {
        message: String,
    },
    Stream {
        content: String,
        done: bool,
    },
    Complete {
        message: String,
    },
    Error {
        message: String,
    },
    Cleared {
        message: String,
    },
    PeerJoined {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    PeerLeft {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    VideoStarted(Negotiation),
    VideoStopped(Negotiation),
    WebrtcOffer(Negotiation),
    WebrtcAnswer(Negotiation),
    WebrtcIce(Negotiation),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire `type` discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Ack { .. } => "ack",
            Self::Stream { .. } => "stream",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Cleared { .. } => "cleared",
            Self::PeerJoined { .. } => "peer-joined",
            Self::PeerLeft { .. } => "peer-left",
            Self::VideoStarted(_) => "video-started",
            Self::VideoStopped(_) => "video-stopped",
            Self::WebrtcOffer(_) => "webrtc-offer",
            Self::WebrtcAnswer(_) => "webrtc-answer",
            Self::WebrtcIce(_) => "webrtc-ice",
        }
    }
}

/// Decode a [`ClientMessage`] from a text frame.
///
/// Separates undecodable frames from well-formed frames with an unrecognised
/// `type`, so the caller can report each distinctly.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();
    if !ClientMessage::KINDS.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidFields { kind, source })
}

/// Encode a [`ServerMessage`] to a JSON string for a text frame.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Decode a [`ServerMessage`]; used by clients and tests.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_presence() {
        let msg = decode_client_message(r#"{"type":"presence","peerId":"p1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Presence(Presence {
                peer_id: "p1".into()
            })
        );
    }

    #[test]
    fn decodes_chat_with_files_and_defaults() {
        let text = json!({
            "type": "chat",
            "content": "look at this",
            "files": [{ "name": "a.png", "type": "image/png", "data": "data:image/png;base64,AAAA" }]
        })
        .to_string();
        match decode_client_message(&text).unwrap() {
            ClientMessage::Chat(req) => {
                assert_eq!(req.content.as_deref(), Some("look at this"));
                assert!(req.model.is_none());
                assert_eq!(req.files.len(), 1);
                assert_eq!(req.files[0].media_type, "image/png");
            }
            other => panic!("expected chat, got {other:?}"),
        }

        match decode_client_message(r#"{"type":"chat"}"#).unwrap() {
            ClientMessage::Chat(req) => assert_eq!(req, ChatRequest::default()),
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn clear_ignores_extra_fields() {
        let msg = decode_client_message(r#"{"type":"clear","reason":"x"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Clear);
    }

    #[test]
    fn negotiation_keeps_opaque_payload() {
        let text = json!({
            "type": "webrtc-offer",
            "peerId": "p2",
            "offer": { "type": "offer", "sdp": "v=0..." }
        })
        .to_string();
        match decode_client_message(&text).unwrap() {
            ClientMessage::WebrtcOffer(n) => {
                assert_eq!(n.peer_id.as_deref(), Some("p2"));
                assert_eq!(n.payload.get("offer"), Some(&json!({ "type": "offer", "sdp": "v=0..." })));
                assert!(!n.payload.contains_key("type"));
            }
            other => panic!("expected offer, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_distinguished_from_malformed() {
        assert!(matches!(
            decode_client_message(r#"{"type":"dance"}"#),
            Err(DecodeError::UnknownType(kind)) if kind == "dance"
        ));
        assert!(matches!(
            decode_client_message("not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_client_message(r#"{"content":"hi"}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            decode_client_message(r#"{"type":"presence"}"#),
            Err(DecodeError::InvalidFields { kind, .. }) if kind == "presence"
        ));
    }

    #[test]
    fn server_messages_use_kebab_case_tags() {
        let joined = encode_server_message(&ServerMessage::PeerJoined {
            peer_id: "p1".into(),
        })
        .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&joined).unwrap(),
            json!({ "type": "peer-joined", "peerId": "p1" })
        );

        let stream = encode_server_message(&ServerMessage::Stream {
            content: "he".into(),
            done: false,
        })
        .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&stream).unwrap(),
            json!({ "type": "stream", "content": "he", "done": false })
        );
    }

    #[test]
    fn relayed_negotiation_serializes_flat() {
        let mut payload = serde_json::Map::new();
        payload.insert("candidate".into(), json!({ "candidate": "a=1" }));
        let msg = ServerMessage::WebrtcIce(Negotiation {
            peer_id: Some("p1".into()),
            payload,
        });
        let text = encode_server_message(&msg).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "type": "webrtc-ice", "peerId": "p1", "candidate": { "candidate": "a=1" } })
        );
        assert_eq!(decode_server_message(&text).unwrap(), msg);
    }
}
