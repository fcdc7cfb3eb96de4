mod actor;
mod hub;
mod registry;
pub mod relay;

pub use actor::{Session, SessionCommand, SessionSettings};
pub use hub::{SessionHub, SessionLink};
pub use registry::{ConnectionRegistry, RegisteredConnection};
