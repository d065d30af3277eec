//! Error types for docchat-session

use thiserror::Error;

/// Result type alias using docchat-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] docchat_wire::Error),

    /// The question was empty after trimming
    #[error("Question is empty")]
    EmptyQuestion,

    /// No assistant message with this id in the current conversation
    #[error("No answer with id {0} in this conversation")]
    UnknownMessage(String),
}

impl Error {
    /// Check if this error was caused by cancellation
    pub fn is_aborted(&self) -> bool {
        match self {
            Error::Wire(e) => e.is_aborted(),
            _ => false,
        }
    }

    /// Check if this error is a network failure
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Wire(e) => e.is_transport(),
            _ => false,
        }
    }
}
