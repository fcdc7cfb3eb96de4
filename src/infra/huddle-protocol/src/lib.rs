mod envelope;
mod error;
mod signal;

pub use envelope::*;
pub use error::*;
pub use signal::*;
