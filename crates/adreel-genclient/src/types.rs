//! Wire types for the generation service API.

use serde::{Deserialize, Serialize};

/// Body of a generation submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Composed generation prompt
    pub prompt: String,

    /// Product reference image, when the listing had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

/// Response to a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// The service's identifier for the queued generation
    pub job_id: String,
}

/// State of a generation job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteJobState {
    Pending,
    Running,
    Done,
    Error,
}

impl RemoteJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteJobState::Pending => "pending",
            RemoteJobState::Running => "running",
            RemoteJobState::Done => "done",
            RemoteJobState::Error => "error",
        }
    }

    /// The service will not change this job again.
    pub fn is_settled(&self) -> bool {
        matches!(self, RemoteJobState::Done | RemoteJobState::Error)
    }
}

/// Response to a status poll. Polling is read-only on the service side and
/// safe to repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub state: RemoteJobState,

    /// Short-lived download URL, present once `state` is `Done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,

    /// Service-side failure detail, present when `state` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
