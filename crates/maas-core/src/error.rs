//! Error types for MAAS operations.
//!
//! Failures are split by where they happened: [`TransportError`] when no HTTP
//! response was obtained, [`ServerError`] when the server answered with a
//! failure status, and the remaining [`Error`] variants for classification done
//! above the dispatcher (version negotiation, credentials, decoding).

use reqwest::StatusCode;
use thiserror::Error;

/// A request that never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Create a transport error with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Description of the underlying failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::new(format!("connection failed: {err}"))
        } else {
            Self::new(err.to_string())
        }
    }
}

/// A failure status returned by the MAAS server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ServerError: {status} ({body})")]
pub struct ServerError {
    status: StatusCode,
    body: String,
}

impl ServerError {
    /// Create a server error from a status code and the response body text.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// HTTP status code of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Full response body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Failure of a single dispatch cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No HTTP response was obtained
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// The server answered with a status >= 400
    #[error("{0}")]
    Server(ServerError),
}

impl DispatchError {
    /// Returns the server error, or `None` for transport failures.
    #[must_use]
    pub const fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            Self::Transport(_) => None,
        }
    }

    /// Returns true if no HTTP response was obtained.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Main error type for MAAS operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No HTTP response was obtained
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// The server rejected the call
    #[error("{0}")]
    Server(ServerError),

    /// No mutually supported API version
    #[error("Unsupported API version: {0}")]
    UnsupportedVersion(String),

    /// Credentials were rejected
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Response body did not match the expected document
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// The server refused the request as malformed
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist
    #[error("No match: {0}")]
    NoMatch(String),

    /// The request conflicts with the resource state
    #[error("Cannot complete: {0}")]
    CannotComplete(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Specialized result type for MAAS operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Server(_) => "SERVER_ERROR",
            Self::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            Self::Permission(_) => "PERMISSION_DENIED",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NoMatch(_) => "NO_MATCH",
            Self::CannotComplete(_) => "CANNOT_COMPLETE",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
        }
    }

    /// Returns the server error if this error carries one.
    ///
    /// Transport failures and client-side classifications return `None`, so
    /// callers can tell "the network failed" from "the server rejected the call".
    #[must_use]
    pub const fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the HTTP status code for server errors.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.server_error().map(ServerError::status)
    }

    /// Returns true if credentials should be re-requested from the user.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }
}

impl From<DispatchError> for Error {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Transport(err) => Self::Transport(err),
            DispatchError::Server(err) => Self::Server(err),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
