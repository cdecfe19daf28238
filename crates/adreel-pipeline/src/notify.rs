//! Terminal-state notification hub.
//!
//! One event is published when a job reaches `Completed` or `Failed`; the
//! out-of-scope API/notification layer subscribes to push the result to
//! the user. Losing events to a lagging subscriber is acceptable: the job
//! record in the store is the source of truth, the hub is only a nudge.

use tokio::sync::broadcast;
use tracing::debug;

use adreel_models::{JobError, JobId, JobStatus, VideoJob};

/// Default buffered event capacity.
const DEFAULT_CAPACITY: usize = 256;

/// A terminal job outcome.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: JobId,
    pub user_id: String,
    pub status: JobStatus,
    /// Present for failed jobs
    pub error: Option<JobError>,
}

impl JobEvent {
    fn from_job(job: &VideoJob) -> Self {
        Self {
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            status: job.status,
            error: job.error.clone(),
        }
    }
}

/// Broadcast hub for terminal job events.
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<JobEvent>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to terminal job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Publish a terminal outcome. No-op for non-terminal statuses.
    pub fn publish(&self, job: &VideoJob) {
        if !matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
            return;
        }

        // Err means no subscribers, which is fine
        if self.tx.send(JobEvent::from_job(job)).is_err() {
            debug!(job_id = %job.id, "No notification subscribers");
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::VideoStyle;

    #[tokio::test]
    async fn test_publishes_terminal_states_only() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        let mut job = VideoJob::new("user-1", VideoStyle::Lifestyle, "prompt", None);
        hub.publish(&job); // Queued, not published

        job.transition(JobStatus::Generating).unwrap();
        job.transition(JobStatus::Failed).unwrap();
        hub.publish(&job);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, job.id);
        assert_eq!(event.status, JobStatus::Failed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let hub = NotificationHub::new();
        let mut job = VideoJob::new("user-1", VideoStyle::Lifestyle, "prompt", None);
        job.transition(JobStatus::Cancelled).unwrap();
        hub.publish(&job);
    }
}
