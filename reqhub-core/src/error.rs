//! Transport-neutral error taxonomy
//!
//! Repositories classify raw database errors into [`RepoError`]; services
//! translate those into [`Error`], whose [`ErrorKind`] decides the
//! façade's status code.

use serde::Serialize;
use thiserror::Error;

use crate::db::RepoError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Field-level validation failure with a machine-readable code
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<String>>,
}

impl ValidationError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            valid_values: None,
        }
    }

    pub fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn valid_values<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.valid_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Service-level errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    ForeignKey(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: &str, key: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} not found: {}", what, key))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::new(code, message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DuplicateKey(_) => ErrorKind::DuplicateKey,
            Error::ForeignKey(_) => ErrorKind::ForeignKey,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The validation payload, if this is a validation error
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<RepoError> for Error {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity, key } => Error::not_found(entity, key),
            RepoError::DuplicateKey(detail) => {
                Error::DuplicateKey(format!("duplicate key: {}", detail))
            }
            RepoError::ForeignKey(detail) => {
                Error::ForeignKey(format!("invalid reference: {}", detail))
            }
            RepoError::Cancelled => Error::Cancelled,
            RepoError::InvalidQuery(detail) => Error::validation("INVALID_QUERY", detail),
            other => {
                tracing::error!(error = %other, "unclassified repository error");
                Error::Internal(other.to_string())
            }
        }
    }
}

/// Error categories, one per façade status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    ForeignKey,
    Validation,
    Conflict,
    Unauthorized,
    Forbidden,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DuplicateKey => "DUPLICATE_KEY",
            ErrorKind::ForeignKey => "FOREIGN_KEY",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::DuplicateKey | ErrorKind::Conflict => 409,
            ErrorKind::ForeignKey | ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::Cancelled => 503,
            ErrorKind::Internal => 500,
        }
    }
}

/// Uniform error body returned by every façade
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let details = match err {
            Error::Validation(v) => serde_json::to_value(v).ok(),
            Error::Conflict { details, .. } => details.clone(),
            _ => None,
        };
        // Internal details stay in the log
        let message = match err {
            Error::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.kind().code().to_string(),
            message,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_found("epic", "EP-1").kind().http_status(), 404);
        assert_eq!(Error::conflict("busy").kind().http_status(), 409);
        assert_eq!(Error::validation("X", "bad").kind().http_status(), 400);
        assert_eq!(Error::Unauthorized("no".into()).kind().http_status(), 401);
        assert_eq!(Error::Forbidden("no".into()).kind().http_status(), 403);
        assert_eq!(Error::Internal("boom".into()).kind().http_status(), 500);
    }

    #[test]
    fn test_error_response_carries_valid_values() {
        let err = Error::Validation(
            ValidationError::new("INVALID_STATUS_TRANSITION", "cannot move Draft to Done")
                .field("status")
                .valid_values(["Active"]),
        );
        let body = ErrorResponse::from(&err);
        assert_eq!(body.code, "VALIDATION");
        let details = body.details.unwrap();
        assert_eq!(details["valid_values"], serde_json::json!(["Active"]));
        assert_eq!(details["code"], "INVALID_STATUS_TRANSITION");
    }

    #[test]
    fn test_internal_message_is_masked() {
        let body = ErrorResponse::from(&Error::Internal("disk I/O error".into()));
        assert_eq!(body.code, "INTERNAL");
        assert!(!body.message.contains("disk"));
    }

    #[test]
    fn test_repo_errors_map_to_kinds() {
        let err: Error = RepoError::DuplicateKey("users.username".into()).into();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        let err: Error = RepoError::ForeignKey("epic_id".into()).into();
        assert_eq!(err.kind(), ErrorKind::ForeignKey);
        let err: Error = RepoError::Cancelled.into();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
