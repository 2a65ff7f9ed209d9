//! HTTP error responses

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gram_core::error::{ErrorKind, ServiceError};
use serde::{Deserialize, Serialize};

/// Error body returned to API clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Service error carried to the HTTP boundary
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ServiceError::bad_request(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(ServiceError::bad_request(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Invalid | ErrorKind::Unsupported => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvariantViolation | ErrorKind::Unexpected => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind.is_internal() {
            tracing::error!(error = %self.0, kind = %kind, "Request failed");
        }

        let body = ErrorBody {
            kind: if kind.is_internal() {
                ErrorKind::Unexpected
            } else {
                kind
            },
            message: self.0.public_message(),
        };

        (status_for(kind), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServiceError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ServiceError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ServiceError::invalid("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::Unsupported("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::not_found("x"), StatusCode::NOT_FOUND),
            (ServiceError::invariant("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::unexpected("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_are_masked() {
        let response = ApiError(ServiceError::invariant("deployment has no events")).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.kind, ErrorKind::Unexpected);
        assert!(!body.message.contains("no events"));
    }
}
