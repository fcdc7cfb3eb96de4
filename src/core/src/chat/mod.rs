mod backend;
mod driver;
mod normalize;
mod ollama;
mod transcript;
mod turn;

pub use backend::{
    BackendError, CompletionBackend, CompletionChunk, CompletionRequest, CompletionStream,
};
pub use driver::{CompletionDriver, DriverPhase, TurnOutcome, ORIGIN_SEND_DEADLINE};
pub use normalize::normalize;
pub use ollama::OllamaBackend;
pub use transcript::TranscriptStore;
pub use turn::{ContentPart, Role, Turn, TurnContent};
