use thiserror::Error;

/// A line that could not be turned into a message. The connection survives these.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid {what} '{value}'")]
    InvalidArgument { what: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Line exceeded max length")]
    FrameLength,
    #[error("Line is not valid UTF-8")]
    Encoding,
    #[error("Connection reset by peer")]
    ConnectionReset,
    #[error("I/O Error: {0}")]
    Io(std::io::Error),
    #[error("Malformed line: {0}")]
    Malformed(ProtocolError),
}

impl FrameError {
    /// Whether the connection can keep being read after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_) | FrameError::Encoding)
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for FrameError {
    fn from(e: ProtocolError) -> Self {
        Self::Malformed(e)
    }
}
