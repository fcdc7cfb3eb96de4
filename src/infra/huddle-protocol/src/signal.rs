use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ServerMessage;

/// A negotiation message between peers.
///
/// Only `peerId` is interpreted; every other field is carried through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    /// Inbound: the target peer (directed kinds) or the sender's own id.
    /// Outbound: the peer that sent the message.
    #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// The negotiation message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    VideoStarted,
    VideoStopped,
    WebrtcOffer,
    WebrtcAnswer,
    WebrtcIce,
}

impl SignalKind {
    /// Directed kinds go to one named peer; the rest are broadcast.
    pub fn is_directed(self) -> bool {
        matches!(
            self,
            Self::WebrtcOffer | Self::WebrtcAnswer | Self::WebrtcIce
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VideoStarted => "video-started",
            Self::VideoStopped => "video-stopped",
            Self::WebrtcOffer => "webrtc-offer",
            Self::WebrtcAnswer => "webrtc-answer",
            Self::WebrtcIce => "webrtc-ice",
        }
    }

    /// Wrap a negotiation payload in the outbound message of the same kind.
    pub fn into_message(self, negotiation: Negotiation) -> ServerMessage {
        match self {
            Self::VideoStarted => ServerMessage::VideoStarted(negotiation),
            Self::VideoStopped => ServerMessage::VideoStopped(negotiation),
            Self::WebrtcOffer => ServerMessage::WebrtcOffer(negotiation),
            Self::WebrtcAnswer => ServerMessage::WebrtcAnswer(negotiation),
            Self::WebrtcIce => ServerMessage::WebrtcIce(negotiation),
        }
    }
}
