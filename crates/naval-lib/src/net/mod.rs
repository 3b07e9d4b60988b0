pub use error::{FrameError, ProtocolError};
pub use message::{ClientMessage, ServerMessage, Verdict};

pub mod connection;
mod error;
mod message;
