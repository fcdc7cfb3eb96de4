use std::future::Future;
use std::pin::Pin;

use futures::stream::BoxStream;
use thiserror::Error;

use super::turn::Turn;

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionChunk {
    pub content: String,
    /// Set on the backend's final increment.
    pub done: bool,
}

impl CompletionChunk {
    pub fn new(content: impl Into<String>, done: bool) -> Self {
        Self {
            content: content.into(),
            done,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid stream line: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

/// Borrowed view of one completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub turns: &'a [Turn],
}

pub type CompletionStream = BoxStream<'static, Result<CompletionChunk, BackendError>>;

/// External completion service.
///
/// The returned future resolves once the request is accepted; the stream then
/// yields increments in backend order and ends at end-of-stream, or yields an
/// error at any point. Implementations are shared across sessions.
pub trait CompletionBackend: Send + Sync + 'static {
    fn stream_chat<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, BackendError>> + Send + 'a>>;
}
