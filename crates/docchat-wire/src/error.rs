//! Error types for docchat-wire

use thiserror::Error;

/// Result type alias using docchat-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A complete stream frame carried an `error` field
    #[error("{0}")]
    Backend(String),

    /// Stream was aborted by the caller
    #[error("Request aborted")]
    Aborted,

    /// A frame parsed as JSON but did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a transport-level failure rather than a backend answer
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_))
    }

    /// Check if this error was caused by cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_displays_message_only() {
        let e = Error::Backend("The model is unavailable".into());
        assert_eq!(e.to_string(), "The model is unavailable");
    }

    #[test]
    fn test_aborted_classification() {
        assert!(Error::Aborted.is_aborted());
        assert!(!Error::Aborted.is_transport());
        assert!(!Error::Backend("x".into()).is_aborted());
    }
}
