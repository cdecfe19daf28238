//! Generation client error types.

use thiserror::Error;

pub type GenResult<T> = Result<T, GenError>;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unknown generation job: {0}")]
    NotFound(String),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenError {
    pub fn submission_rejected(msg: impl Into<String>) -> Self {
        Self::SubmissionRejected(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn asset_unavailable(msg: impl Into<String>) -> Self {
        Self::AssetUnavailable(msg.into())
    }

    /// Check if error is retryable (transient upstream trouble).
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenError::ServiceUnavailable(_) | GenError::Network(_))
    }
}
