use arta_providers::ProviderError;
use arta_types::ErrorCode;
use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Orchestration failures that abort the turn. Tool resolver errors do NOT
/// land here; the executor records them and lets synthesis decide.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("plan dependency unmet: step `{step}` requires `{missing}`")]
    DependencyUnmet { step: String, missing: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("orchestration error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Provider(err) => err.code(),
            OrchestratorError::DependencyUnmet { .. } => ErrorCode::InternalError,
            OrchestratorError::Storage(_) => ErrorCode::InternalError,
            OrchestratorError::Internal(_) => ErrorCode::InternalError,
        }
    }
}
