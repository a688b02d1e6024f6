//! Server error types.

use std::fmt;

use polymorph_core::SessionError;

/// Errors that can occur in the server or client runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error
    Config(String),

    /// Transport/network error
    Transport(String),

    /// Peer violated the stream framing
    Protocol(String),

    /// Session rejected an event
    Session(SessionError),
}

impl ServerError {
    /// Returns true if the connection cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Session(err) => err.is_fatal(),
            Self::Config(_) | Self::Transport(_) | Self::Protocol(_) => true,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Session(err) => write!(f, "session error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for ServerError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
