use thiserror::Error;

/// Failure to turn an inbound text frame into a [`ClientMessage`](crate::ClientMessage).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("missing 'type' field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid '{kind}' message: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
