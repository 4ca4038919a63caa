use thiserror::Error;

use crate::state::SessionState;

/// Errors raised while building or parsing STOMP frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Login must not be empty")]
    EmptyLogin,

    #[error("Login contains control characters")]
    InvalidLogin,

    #[error("Invalid destination: {0:?}")]
    InvalidDestination(String),

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence in header value: {0:?}")]
    InvalidEscape(String),

    #[error("Frame is not terminated by NUL")]
    Unterminated,

    #[error("Frame has no header/body separator")]
    MissingSeparator,

    #[error("content-length {declared} exceeds body of {actual} bytes")]
    ContentLengthMismatch { declared: usize, actual: usize },

    #[error("Invalid content-length: {0:?}")]
    InvalidContentLength(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Codec error: {0}")]
    CodecError(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
