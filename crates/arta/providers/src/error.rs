use arta_types::ErrorCode;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider-layer errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// All retry attempts exhausted; carries the last underlying message.
    #[error("provider unavailable: {0}")]
    Exhausted(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Model output failed JSON coercion or schema validation.
    #[error("model output invalid: {0}")]
    InvalidOutput(String),

    #[error("missing API key for provider {0}")]
    MissingApiKey(String),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Transport(_)
            | ProviderError::Status { .. }
            | ProviderError::Exhausted(_)
            | ProviderError::MissingApiKey(_) => ErrorCode::ProviderUnavailable,
            ProviderError::Cancelled => ErrorCode::Cancelled,
            ProviderError::InvalidOutput(_) => ErrorCode::ModelOutputInvalid,
            ProviderError::InvalidConfig(_) => ErrorCode::InternalError,
        }
    }

    /// True for failures the router retries: network errors and non-2xx
    /// upstream responses.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Status { .. }
        )
    }
}

/// Truncate an upstream message for the error envelope.
pub(crate) fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        message.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(
            ProviderError::Exhausted("x".into()).code(),
            ErrorCode::ProviderUnavailable
        );
        assert_eq!(ProviderError::Cancelled.code(), ErrorCode::Cancelled);
        assert_eq!(
            ProviderError::InvalidOutput("x".into()).code(),
            ErrorCode::ModelOutputInvalid
        );
    }

    #[test]
    fn retryability() {
        assert!(ProviderError::Transport("reset".into()).retryable());
        assert!(ProviderError::Status {
            status: 500,
            body: String::new()
        }
        .retryable());
        assert!(!ProviderError::Cancelled.retryable());
        assert!(!ProviderError::InvalidOutput("bad".into()).retryable());
    }

    #[test]
    fn truncation_is_char_safe() {
        let long = "é".repeat(300);
        assert_eq!(truncate_message(&long, 200).chars().count(), 200);
        assert_eq!(truncate_message("short", 200), "short");
    }
}
