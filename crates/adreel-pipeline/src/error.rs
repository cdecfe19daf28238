//! Pipeline error types and user-facing failure classification.

use thiserror::Error;

use adreel_models::{InvalidTransition, JobErrorCode, JobId};
use adreel_store::{LedgerError, StoreError};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Lost job ownership: {0}")]
    Conflict(String),

    #[error("Poll budget exhausted after {attempts} attempts")]
    PollBudgetExhausted { attempts: u32 },

    #[error("Generation service reported failure: {0}")]
    RemoteGenerationFailed(String),

    #[error("Generation service reported done without an asset URL")]
    MissingAssetUrl,

    #[error("Job has no external job id to resume from")]
    MissingExternalJobId,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] adreel_genclient::GenError),

    #[error("Storage error: {0}")]
    Storage(#[from] adreel_storage::StorageError),

    #[error("Invalid transition: {0}")]
    Transition(#[from] InvalidTransition),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// True when this error means the current worker must stop driving the
    /// job without resolving it: a race or programming defect, not a
    /// failure of the job itself. Logged loudly, nothing written.
    pub fn aborts_drive(&self) -> bool {
        matches!(
            self,
            PipelineError::Conflict(_)
                | PipelineError::JobNotFound(_)
                | PipelineError::Transition(_)
                | PipelineError::Store(_)
        )
    }

    /// Classify a job-level failure into the user-facing category.
    ///
    /// Typed variants map directly; free-text detail from the generation
    /// service falls back to keyword matching.
    pub fn classify(&self) -> JobErrorCode {
        match self {
            PipelineError::PollBudgetExhausted { .. } => JobErrorCode::Timeout,
            PipelineError::Generation(e) if e.is_retryable() => JobErrorCode::ServiceUnavailable,
            PipelineError::Generation(adreel_genclient::GenError::SubmissionRejected(_)) => {
                JobErrorCode::GenerationIncomplete
            }
            PipelineError::Generation(adreel_genclient::GenError::AssetUnavailable(_)) => {
                JobErrorCode::GenerationIncomplete
            }
            PipelineError::Generation(adreel_genclient::GenError::NotFound(_)) => {
                JobErrorCode::GenerationIncomplete
            }
            PipelineError::MissingAssetUrl => JobErrorCode::GenerationIncomplete,
            PipelineError::RemoteGenerationFailed(detail) => classify_detail(detail),
            PipelineError::Ledger(e) if e.is_retryable() => JobErrorCode::ServiceUnavailable,
            _ => JobErrorCode::Internal,
        }
    }
}

/// Keyword classification for free-text failure detail from the service.
fn classify_detail(detail: &str) -> JobErrorCode {
    let msg = detail.to_lowercase();

    if msg.contains("timed out") || msg.contains("timeout") || msg.contains("deadline") {
        return JobErrorCode::Timeout;
    }

    if msg.contains("unavailable") || msg.contains("overloaded") || msg.contains("capacity") {
        return JobErrorCode::ServiceUnavailable;
    }

    JobErrorCode::GenerationIncomplete
}
