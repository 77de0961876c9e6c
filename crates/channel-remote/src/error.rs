//! Error types for channel-remote

use thiserror::Error;

/// Errors that can occur while talking to remote services
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure (connection, TLS, timeout)
    #[error("HTTP error for {uri}: {message}")]
    Http { uri: String, message: String },

    /// The service answered with a non-success status
    #[error("{uri} returned HTTP {status}")]
    Status { uri: String, status: u16 },

    /// The response body could not be decoded
    #[error("failed to decode response from {uri}: {message}")]
    Decode { uri: String, message: String },

    /// Pull-request creation needs a token
    #[error("cannot create pull requests without a configured GitHub token")]
    MissingToken,

    /// Notification delivery failed
    #[error("notification failed: {0}")]
    Notify(String),
}

impl RemoteError {
    pub(crate) fn http(uri: impl Into<String>, err: reqwest::Error) -> Self {
        RemoteError::Http {
            uri: uri.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(uri: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RemoteError::Decode {
            uri: uri.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
