use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the client
pub type ApiResult<T> = Result<T, ApiError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Unauthenticated,
    AuthorizationExpired,
    SessionExpired,
    Validation,
    Rejected,
    Server,
    Decode,
    Storage,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::AuthorizationExpired => "AUTHORIZATION_EXPIRED",
            ErrorKind::SessionExpired => "SESSION_EXPIRED",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Rejected => "REQUEST_REJECTED",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Decode => "DECODE_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Config => "CONFIG_INVALID",
        };
        write!(f, "{}", code_str)
    }
}

/// Failure outcome of any call made through the client.
///
/// Cloneable because a single refresh outcome is handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No response was received
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// No credential is available, short-circuited locally
    #[error("Not authenticated")]
    Unauthenticated,

    /// The server answered 401
    #[error("Authorization expired (status 401)")]
    AuthorizationExpired { body: Option<Value> },

    /// Refreshing the access token failed; the session has been cleared
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// 400/422 with field-level errors, left for the caller to interpret
    #[error("Validation failed (status {status})")]
    Validation { status: u16, body: Option<Value> },

    /// Any other 4xx
    #[error("Request rejected (status {status})")]
    Rejected { status: u16, body: Option<Value> },

    #[error("Server error (status {status})")]
    Server { status: u16, body: Option<Value> },

    /// A 2xx body that does not match the expected shape
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// Durable session storage failed
    #[error("Session storage error: {message}")]
    Storage { message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Classify a non-2xx response
    pub fn from_status(status: u16, body: Option<Value>) -> Self {
        match status {
            401 => ApiError::AuthorizationExpired { body },
            400 | 422 => ApiError::Validation { status, body },
            500..=599 => ApiError::Server { status, body },
            _ => ApiError::Rejected { status, body },
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::Decode {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ApiError::Storage {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Unauthenticated => ErrorKind::Unauthenticated,
            ApiError::AuthorizationExpired { .. } => ErrorKind::AuthorizationExpired,
            ApiError::SessionExpired => ErrorKind::SessionExpired,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Rejected { .. } => ErrorKind::Rejected,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::Storage { .. } => ErrorKind::Storage,
            ApiError::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status of the response that produced this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthorizationExpired { .. } => Some(401),
            ApiError::Validation { status, .. }
            | ApiError::Rejected { status, .. }
            | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body, parsed as JSON when possible
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::AuthorizationExpired { body }
            | ApiError::Validation { body, .. }
            | ApiError::Rejected { body, .. }
            | ApiError::Server { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Whether this outcome should look like an explicit logout to the user
    pub fn ends_session(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::decode(err.to_string())
    }
}
