//! Service error taxonomy
//!
//! Every fallible deployment operation returns [`ServiceError`]. Callers
//! branch on [`ErrorKind`] rather than on concrete variants; the HTTP layer
//! maps kinds to status codes and never exposes internal details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blob::BlobError;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    Invalid,
    Unsupported,
    NotFound,
    InvariantViolation,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::Unexpected => "unexpected",
        }
    }

    /// Internal kinds are reported to clients as `unexpected`.
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorKind::InvariantViolation | ErrorKind::Unexpected)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by deployment operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    NotFound(String),

    /// Accumulated attachment validation failures
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("blob storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("{0}")]
    Unexpected(String),
}

impl ServiceError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::Invalid(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        ServiceError::InvariantViolation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        ServiceError::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::Invalid(_) => ErrorKind::Invalid,
            ServiceError::Unsupported(_) => ErrorKind::Unsupported,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(err) => err.kind(),
            ServiceError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            ServiceError::Store(_) | ServiceError::Blob(_) | ServiceError::Unexpected(_) => {
                ErrorKind::Unexpected
            }
        }
    }

    /// Message safe to show to API clients.
    pub fn public_message(&self) -> String {
        if self.kind().is_internal() {
            "an unexpected error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
