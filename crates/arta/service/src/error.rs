//! API error type and the JSON error envelope.

use arta_aggregate::AggregateError;
use arta_governor::RateLimited;
use arta_identity::IdentityError;
use arta_orchestrator::OrchestratorError;
use arta_providers::ProviderError;
use arta_storage::StorageError;
use arta_types::{ErrorCode, ErrorEnvelope, ValidationIssue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// One error type for every handler; renders as `{code, message, details?}`
/// with the HTTP status derived from the code.
#[derive(Debug)]
pub struct ApiError(pub ErrorEnvelope);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self(ErrorEnvelope::new(code, message))
    }

    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self(ErrorEnvelope::validation(issues))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, what)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.0.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::NotFound(_) => ErrorCode::NotFound,
            StorageError::Conflict(_) => ErrorCode::IdempotencyConflict,
            StorageError::InvalidInput(_) => ErrorCode::ValidationError,
            _ => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<RateLimited> for ApiError {
    fn from(err: RateLimited) -> Self {
        Self(
            ErrorEnvelope::new(ErrorCode::RateLimit, err.to_string())
                .with_details(serde_json::json!({ "retryAfter": err.retry_after })),
        )
    }
}
