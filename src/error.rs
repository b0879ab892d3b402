//! Error types for the studyhub client.
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! side is the [`Error`] enum below. Transport-level failures for non-2xx
//! responses carry a [`TransportError`] with the status and raw body so
//! callers can render a message or route a 401 to the refresh path.

use std::fmt;

use crate::types::job::JobStatus;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-2xx HTTP response from the backend.
///
/// # Examples
///
/// ```
/// use studyhub::error::TransportError;
///
/// let err = TransportError::new(404, "study not found");
/// assert!(!err.is_unauthorized());
/// assert_eq!(err.to_string(), "HTTP 404: study not found");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body, as returned by the server.
    pub body: String,
}

impl TransportError {
    /// Creates a transport error from a status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 401 responses.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.body)
    }
}

impl std::error::Error for TransportError {}

/// Errors returned by the studyhub client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server answered with a non-2xx status.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Network-level failure before any HTTP status was received.
    #[error("network error: {0}")]
    Network(String),

    /// Missing, expired, or rejected credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A payload did not match the expected wire shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid input supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A status change that would move a record backwards.
    #[error("invalid transition from {from} to {to} for {id}")]
    InvalidTransition {
        /// Identity of the record.
        id: String,
        /// Current status.
        from: JobStatus,
        /// Rejected target status.
        to: JobStatus,
    },

    /// The push channel is closed or was torn down.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a transport error from a status and body.
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(status, body))
    }

    /// Creates an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns `true` when the failure means the credentials were rejected.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Transport(t) => t.is_unauthorized(),
            Self::Authentication(_) => true,
            _ => false,
        }
    }

    /// HTTP status for transport errors, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(t) => Some(t.status),
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration(format!("invalid URL: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(format!("invalid TOML: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::transport(status.as_u16(), err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(err.to_string())
    }
}
