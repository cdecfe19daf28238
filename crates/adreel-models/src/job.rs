//! Video generation job record.
//!
//! A `VideoJob` is the single externally observable record per generation
//! request. It is owned by the pipeline orchestrator from creation until it
//! reaches a terminal state; no other component mutates its status.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::status::{InvalidTransition, JobStatus};
use crate::style::VideoStyle;

/// Unique identifier for a video generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored asset metadata, recorded when a job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetInfo {
    /// Object storage identifier for the video
    pub public_id: String,
    /// Stable HTTPS URL of the stored object
    pub secure_url: String,
    /// Thumbnail URL (sibling of the video object)
    pub thumbnail_url: String,
    /// Presigned download URL
    pub download_url: String,
    /// When the presigned download URL lapses
    pub download_expires_at: DateTime<Utc>,
}

/// Category of a terminal job failure, used to pick the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorCode {
    /// Poll budget exhausted before the external service finished
    Timeout,
    /// Upstream outage or repeated transient failures
    ServiceUnavailable,
    /// The external service reported an error or produced no asset
    GenerationIncomplete,
    /// Anything else
    Internal,
}

impl JobErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorCode::Timeout => "timeout",
            JobErrorCode::ServiceUnavailable => "service_unavailable",
            JobErrorCode::GenerationIncomplete => "generation_incomplete",
            JobErrorCode::Internal => "internal",
        }
    }

    /// User-facing message for this failure category.
    pub fn user_message(&self) -> &'static str {
        match self {
            JobErrorCode::Timeout => "Video generation timed out. Please try again.",
            JobErrorCode::ServiceUnavailable => {
                "The video service is temporarily unavailable. Please try again in a few minutes."
            }
            JobErrorCode::GenerationIncomplete => {
                "The video could not be generated from this script. Please adjust it and try again."
            }
            JobErrorCode::Internal => "Something went wrong while generating your video.",
        }
    }
}

/// Terminal failure details recorded on the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub code: JobErrorCode,
    /// User-facing message (never an internal error string)
    pub message: String,
}

impl JobError {
    pub fn new(code: JobErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One user-requested video generation, tracked through the status
/// state machine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    /// Unique job ID
    pub id: JobId,

    /// Owning account; immutable after creation
    pub user_id: String,

    /// Current lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Style the prompt was composed for
    pub style: VideoStyle,

    /// Composed generation prompt; immutable once submitted
    pub prompt: String,

    /// Product reference image passed to the generation service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,

    /// Identifier returned by the generation service; set once, never
    /// overwritten
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,

    /// Credits debited for this job
    #[serde(default)]
    pub credits_used: u32,

    /// Poll attempts consumed so far (persisted so a resumed worker
    /// inherits the remaining budget)
    #[serde(default)]
    pub polls_used: u32,

    /// Stored asset metadata, present once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetInfo>,

    /// Failure details, present only in terminal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the job was submitted to the external service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last write timestamp; doubles as the liveness heartbeat for the
    /// stale-job resume scan
    pub updated_at: DateTime<Utc>,

    /// Record version for optimistic-concurrency writes
    #[serde(default)]
    pub version: u64,
}

impl VideoJob {
    /// Create a new job in `Queued`.
    pub fn new(
        user_id: impl Into<String>,
        style: VideoStyle,
        prompt: impl Into<String>,
        reference_image_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            status: JobStatus::Queued,
            style,
            prompt: prompt.into(),
            reference_image_url,
            external_job_id: None,
            credits_used: 0,
            polls_used: 0,
            asset: None,
            error: None,
            created_at: now,
            generation_started_at: None,
            completed_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Apply a guarded status transition.
    ///
    /// Sets the lifecycle timestamps exactly once: `generation_started_at`
    /// on entering `Generating`, `completed_at` on entering any terminal
    /// state. Returns `InvalidTransition` (and mutates nothing) for an
    /// illegal edge.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;

        if next == JobStatus::Generating && self.generation_started_at.is_none() {
            self.generation_started_at = Some(now);
        }
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        Ok(())
    }

    /// Record the external job id. A no-op if one is already set.
    pub fn record_external_job_id(&mut self, external_id: impl Into<String>) {
        if self.external_job_id.is_none() {
            self.external_job_id = Some(external_id.into());
            self.updated_at = Utc::now();
        }
    }

    /// Record a consumed poll attempt and bump the heartbeat.
    pub fn record_poll(&mut self) {
        self.polls_used += 1;
        self.updated_at = Utc::now();
    }

    /// Bump the heartbeat without other changes.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Status as seen by readers at `now`.
    ///
    /// A `Completed` job whose signed download URL has lapsed reads as
    /// `Expired`. This is the only way a job becomes `Expired`; nothing is
    /// written back.
    pub fn effective_status(&self, now: DateTime<Utc>) -> JobStatus {
        if self.status == JobStatus::Completed {
            if let Some(asset) = &self.asset {
                if asset.download_expires_at <= now {
                    return JobStatus::Expired;
                }
            }
        }
        self.status
    }

    /// Check whether a non-terminal job has gone quiet for longer than
    /// `threshold_secs` and should be picked up by the resume scan.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        !self.is_terminal() && (now - self.updated_at).num_seconds() > threshold_secs
    }
}
