pub mod chat;
mod config;
mod connection;
mod huddle_config;
mod outbound;
pub mod paths;
mod server;
pub mod session;

pub use chat::{
    BackendError, CompletionBackend, CompletionChunk, CompletionRequest, CompletionStream,
    OllamaBackend,
};
pub use config::ServerConfig;
pub use connection::{run_connection, ConnectionParams};
pub use huddle_config::{BackendConfig, ChatConfig, HuddleConfig, DEFAULT_MODEL};
pub use outbound::{ConnectionHandle, DeliveryError};
pub use server::{build_router, load_huddle_config};
pub use session::{SessionHub, SessionLink, SessionSettings};
