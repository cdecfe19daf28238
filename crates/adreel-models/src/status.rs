//! Job status state machine.
//!
//! The status field is the authoritative lifecycle model for a generation
//! job. Transitions are guarded: moving a job that is already terminal is
//! an error, never a silent overwrite. This is what keeps two workers
//! racing on the same job after a restart from double-resolving it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a video generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created and credit debited, not yet submitted upstream
    #[default]
    Queued,
    /// Submitted to the external generation service, polling for completion
    Generating,
    /// External generation done, transferring the asset into durable storage
    Processing,
    /// Asset stored and signed download URL minted
    Completed,
    /// Terminal failure with a user-facing error
    Failed,
    /// Cancelled by the user before external submission
    Cancelled,
    /// Completed, but the signed download URL's TTL has lapsed.
    /// Read-time reclassification only, never written to the store.
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Generating => "generating",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Expired => "expired",
        }
    }

    /// Check if this is a terminal state (no further transitions permitted).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Expired
        )
    }

    /// Check whether a write-time transition to `next` is legal.
    ///
    /// `Expired` is never a legal target: it exists only as a read-time view
    /// of a `Completed` job whose download URL has lapsed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Generating) => true,
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Queued, JobStatus::Cancelled) => true,
            (JobStatus::Generating, JobStatus::Processing) => true,
            (JobStatus::Generating, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected attempt to move a job along an illegal edge.
///
/// Surfacing this loudly (instead of silently succeeding) is the mechanism
/// that prevents double-billing and double-refunding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}
