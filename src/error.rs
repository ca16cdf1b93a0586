//! Error types for bundle lifecycle operations
//!
//! Collaborator failures (Helm, Kubernetes, the metadata store) propagate
//! into [`Error::Upstream`] with the originating system named; local storage
//! failures carry their operation context. The HTTP layer maps each kind to
//! a status code via [`IntoResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for bundle lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for berth operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller is not a known tenant
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No bundle record exists for the caller
    #[error("not found: {0}")]
    NotFound(String),

    /// A state precondition was violated (already active, quota reached, ...)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed upload or stored document
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator call failed
    #[error("upstream error [{system}]: {message}")]
    Upstream {
        /// Which collaborator failed (helm, kubernetes, redis)
        system: &'static str,
        /// Description of what failed
        message: String,
    },

    /// Local bundle storage read/write failed
    #[error("io error [{context}]: {source}")]
    Io {
        /// What was being done when the failure occurred
        context: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an upstream error for the named collaborator
    pub fn upstream(system: &'static str, msg: impl Into<String>) -> Self {
        Self::Upstream {
            system,
            message: msg.into(),
        }
    }

    /// Create an I/O error with operation context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::upstream("kubernetes", e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::upstream("redis", e.to_string())
    }
}
