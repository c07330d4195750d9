//! Error taxonomy shared across the workspace.
//!
//! Each layer keeps its own `thiserror` enum; everything converges on an
//! [`ErrorCode`] when a failure crosses the HTTP boundary. The code decides
//! the HTTP status, the message stays human-readable, and structured context
//! travels in `details`.

use serde::{Deserialize, Serialize};

/// Canonical error codes surfaced in the API envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AuthRequired,
    AuthInvalid,
    NotFound,
    IdempotencyConflict,
    RateLimit,
    BenchmarkOptInRequired,
    ModelOutputInvalid,
    ProviderUnavailable,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::AuthInvalid => "AUTH_INVALID",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::BenchmarkOptInRequired => "BENCHMARK_OPT_IN_REQUIRED",
            ErrorCode::ModelOutputInvalid => "MODEL_OUTPUT_INVALID",
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status derived from the code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 422,
            ErrorCode::AuthRequired | ErrorCode::AuthInvalid => 401,
            ErrorCode::NotFound => 404,
            ErrorCode::IdempotencyConflict => 409,
            ErrorCode::RateLimit => 429,
            ErrorCode::BenchmarkOptInRequired => 403,
            ErrorCode::ModelOutputInvalid => 502,
            ErrorCode::ProviderUnavailable => 503,
            ErrorCode::Cancelled => 499,
            ErrorCode::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path to the offending field, e.g. `transaction.amount`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Wire-level error body: `{code, message, details?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Envelope for a batch of validation issues.
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        let details = serde_json::json!({ "issues": issues });
        Self {
            code: ErrorCode::ValidationError,
            message: "request validation failed".to_string(),
            details: Some(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::BenchmarkOptInRequired).unwrap();
        assert_eq!(json, "\"BENCHMARK_OPT_IN_REQUIRED\"");
        assert_eq!(
            ErrorCode::BenchmarkOptInRequired.as_str(),
            "BENCHMARK_OPT_IN_REQUIRED"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 422);
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::RateLimit.http_status(), 429);
        assert_eq!(ErrorCode::Cancelled.http_status(), 499);
    }

    #[test]
    fn validation_envelope_carries_issues() {
        let env = ErrorEnvelope::validation(vec![ValidationIssue::new("month", "must be YYYY-MM")]);
        let details = env.details.expect("details present");
        assert_eq!(details["issues"][0]["path"], "month");
    }
}
