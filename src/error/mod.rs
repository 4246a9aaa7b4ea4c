//! Centralized error handling for the HSF backend
//!
//! Domain guards fail fast with one of the taxonomy kinds below; the HTTP
//! layer maps each kind to a status code and a JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::amortization::AmortizationError;
use crate::repository::StoreError;
use crate::review::RoutingError;

/// Application error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} {} not found", what, id))
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Invalid(_) => "INVALID",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether a background job failing with this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Internal(_) | AppError::Database(_) | AppError::ServiceUnavailable(_)
        )
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match &self {
            AppError::Internal(_) | AppError::Database(_) | AppError::ServiceUnavailable(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => AppError::Conflict(format!("{} already exists", what)),
            StoreError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

impl From<AmortizationError> for AppError {
    fn from(err: AmortizationError) -> Self {
        AppError::Invalid(err.to_string())
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Invalid(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Invalid(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound("x".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(AppError::Conflict("x".to_string()).error_code(), "CONFLICT");
        assert_eq!(AppError::Forbidden("x".to_string()).error_code(), "FORBIDDEN");
        assert_eq!(AppError::Invalid("x".to_string()).error_code(), "INVALID");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Forbidden("x".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Internal("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_only_server_errors_are_retryable() {
        assert!(AppError::Database("x".to_string()).is_retryable());
        assert!(AppError::ServiceUnavailable("x".to_string()).is_retryable());
        assert!(!AppError::Forbidden("x".to_string()).is_retryable());
        assert!(!AppError::Invalid("x".to_string()).is_retryable());
    }

    #[test]
    fn test_duplicate_store_error_is_conflict() {
        let err: AppError = StoreError::Duplicate("loan".to_string()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
