//! Unified error handling for the kelpie crate
//!
//! This module provides the error type that crosses the API boundary.
//! Domain modules keep their own focused error enums (`RuntimeError`,
//! `EventParseError`, config and server errors); this type folds the ones
//! that surface through HTTP into a single enum that knows its status code
//! and its operator-facing message.

use axum::http::StatusCode;
use thiserror::Error;

use crate::events::EventParseError;
use crate::runtime::RuntimeError;

/// Classification of errors for logging and handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Requested name is not part of the cluster
    NotFound,
    /// Container runtime failures (unreachable daemon, timeouts, API errors)
    Runtime,
    /// Malformed client input
    Client,
    /// Missing or rejected credentials
    Auth,
    /// Unexpected failure inside the service itself
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Runtime => "runtime",
            Self::Client => "client",
            Self::Auth => "auth",
            Self::Internal => "internal",
        }
    }
}

/// Error type for requests crossing the HTTP boundary
///
/// Wraps the domain errors that become responses, so handlers map any
/// failure to a status code and envelope in one place.
#[derive(Error, Debug)]
pub enum Error {
    /// Logical node name is not in the cluster registry
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Container runtime operation failed
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Client sent something unusable (bad query parameter, bad payload)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Credentials missing or rejected
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Unexpected failure inside the service (metrics encoding and the like)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error answers with.
    ///
    /// `OperationTimeout` stays distinct from an unreachable runtime: a
    /// timed-out lifecycle call maps to 504 while a daemon that cannot be
    /// reached at all maps to 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NodeNotFound(_) => StatusCode::NOT_FOUND,
            Self::Runtime(RuntimeError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Runtime(RuntimeError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Runtime(RuntimeError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            Self::Runtime(RuntimeError::Api(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether re-issuing the same request later could succeed.
    ///
    /// An unreachable daemon and a timed-out call are transient: the
    /// operator can retry once the runtime recovers. Unknown names, bad
    /// input, and rejected credentials fail the same way every time.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Runtime(RuntimeError::Unavailable(_) | RuntimeError::Timeout { .. })
        )
    }

    /// Message placed in the response body.
    ///
    /// Kept separate from `Display` so internal detail (socket paths,
    /// runtime error chains) stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NodeNotFound(name) => format!("Container '{}' not found", name),
            Self::Runtime(RuntimeError::NotFound(container)) => {
                format!("Container '{}' not found", container)
            }
            Self::Runtime(e) => e.to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::AuthenticationFailure => "Authentication required".to_string(),
            // Internal detail stays in the logs
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NodeNotFound(_) | Self::Runtime(RuntimeError::NotFound(_)) => {
                ErrorCategory::NotFound
            }
            Self::Runtime(_) => ErrorCategory::Runtime,
            Self::BadRequest(_) => ErrorCategory::Client,
            Self::AuthenticationFailure => ErrorCategory::Auth,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Create a bad-request error from a parse failure
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<EventParseError> for Error {
    fn from(err: EventParseError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::NodeNotFound("master1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Runtime(RuntimeError::Timeout {
                operation: "start master1".into(),
                seconds: 10,
            })
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            Error::Runtime(RuntimeError::Unavailable("connection refused".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Runtime(RuntimeError::Api("conflict".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::AuthenticationFailure.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::bad_request("invalid since").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_public_message_hides_runtime_detail() {
        let err = Error::NodeNotFound("volume9".into());
        assert_eq!(err.public_message(), "Container 'volume9' not found");

        let err = Error::Runtime(RuntimeError::NotFound("seaweed_volume9".into()));
        assert_eq!(err.public_message(), "Container 'seaweed_volume9' not found");
    }

    #[test]
    fn test_category() {
        assert_eq!(
            Error::NodeNotFound("x".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            Error::Runtime(RuntimeError::Unavailable("down".into())).category(),
            ErrorCategory::Runtime
        );
        assert_eq!(Error::AuthenticationFailure.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::Client.as_str(), "client");
    }

    #[test]
    fn test_runtime_conversion() {
        let runtime_err = RuntimeError::Unavailable("socket missing".into());
        let unified: Error = runtime_err.into();
        assert!(matches!(unified, Error::Runtime(_)));
    }

    #[test]
    fn test_is_recoverable() {
        // Transient runtime conditions are worth retrying
        assert!(Error::Runtime(RuntimeError::Unavailable("down".into())).is_recoverable());
        assert!(Error::Runtime(RuntimeError::Timeout {
            operation: "start".into(),
            seconds: 10,
        })
        .is_recoverable());

        // Deterministic failures are not
        assert!(!Error::NodeNotFound("ghost".into()).is_recoverable());
        assert!(!Error::Runtime(RuntimeError::NotFound("ghost".into())).is_recoverable());
        assert!(!Error::bad_request("bad since").is_recoverable());
        assert!(!Error::AuthenticationFailure.is_recoverable());
    }

    #[test]
    fn test_internal_from_anyhow() {
        let unified: Error = anyhow::anyhow!("encoder buffer corrupt").into();

        assert!(matches!(unified, Error::Internal(_)));
        assert_eq!(unified.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unified.category(), ErrorCategory::Internal);
        // The cause stays out of the response body
        assert_eq!(unified.public_message(), "Internal server error");
        assert!(unified.to_string().contains("encoder buffer corrupt"));
    }
}
