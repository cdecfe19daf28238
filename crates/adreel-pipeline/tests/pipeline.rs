//! End-to-end pipeline tests against scripted fakes.
//!
//! The fakes stand in for the external generation service and object
//! storage; the store and ledger are the real in-memory implementations,
//! so every credit and state-machine invariant is exercised for real.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use adreel_genclient::{GenError, GenResult, GenerationClient, PollResponse, RemoteJobState};
use adreel_models::{
    CreditTransactionType, GenerationRequest, JobErrorCode, JobId, JobStatus, VideoJob, VideoStyle,
};
use adreel_pipeline::{
    NotificationHub, PipelineConfig, PipelineError, PipelineOrchestrator, PipelineRunner,
};
use adreel_storage::{AssetPath, AssetStore, StorageError, StorageResult, StoredAsset};
use adreel_store::{CreditLedger, JobStore, LedgerError, MemoryStore};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone)]
enum PollStep {
    Pending,
    Running,
    Done(String),
    DoneWithoutUrl,
    RemoteError(String),
    Unavailable,
}

/// Scripted generation service. Poll steps are consumed in order; the last
/// step sticks, so `[Done(..)]` keeps reporting done for the re-poll during
/// materialization and `[Pending]` never settles.
#[derive(Default)]
struct FakeGeneration {
    submit_failures: AtomicU32,
    reject_submission: bool,
    fetch_unavailable: bool,
    submit_calls: AtomicU32,
    poll_calls: AtomicU32,
    last_poll_id: Mutex<Option<String>>,
    last_fetch_url: Mutex<Option<String>>,
    poll_script: Mutex<VecDeque<PollStep>>,
}

impl FakeGeneration {
    fn with_script(steps: Vec<PollStep>) -> Self {
        Self {
            poll_script: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    fn failing_submits(self, failures: u32) -> Self {
        self.submit_failures.store(failures, Ordering::SeqCst);
        self
    }

    fn submit_count(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for FakeGeneration {
    async fn submit(&self, _prompt: &str, _reference_image_url: Option<&str>) -> GenResult<String> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);

        if self.reject_submission {
            return Err(GenError::submission_rejected("prompt failed moderation"));
        }

        let remaining = self.submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.submit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GenError::service_unavailable("503 upstream"));
        }

        Ok(format!("ext-{n}"))
    }

    async fn poll(&self, external_job_id: &str) -> GenResult<PollResponse> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_poll_id.lock().await = Some(external_job_id.to_string());

        let mut script = self.poll_script.lock().await;
        let step = if script.len() > 1 {
            script.pop_front().expect("non-empty script")
        } else {
            script.front().cloned().unwrap_or(PollStep::Pending)
        };
        drop(script);

        match step {
            PollStep::Pending => Ok(PollResponse {
                state: RemoteJobState::Pending,
                asset_url: None,
                error: None,
            }),
            PollStep::Running => Ok(PollResponse {
                state: RemoteJobState::Running,
                asset_url: None,
                error: None,
            }),
            PollStep::Done(url) => Ok(PollResponse {
                state: RemoteJobState::Done,
                asset_url: Some(url),
                error: None,
            }),
            PollStep::DoneWithoutUrl => Ok(PollResponse {
                state: RemoteJobState::Done,
                asset_url: None,
                error: None,
            }),
            PollStep::RemoteError(detail) => Ok(PollResponse {
                state: RemoteJobState::Error,
                asset_url: None,
                error: Some(detail),
            }),
            PollStep::Unavailable => Err(GenError::service_unavailable("503 upstream")),
        }
    }

    async fn fetch(&self, asset_url: &str) -> GenResult<Vec<u8>> {
        *self.last_fetch_url.lock().await = Some(asset_url.to_string());

        if self.fetch_unavailable {
            return Err(GenError::asset_unavailable("url expired"));
        }
        Ok(b"fake-video-bytes".to_vec())
    }
}

#[derive(Default)]
struct FakeAssets {
    fail_upload: bool,
    uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn upload(&self, bytes: Vec<u8>, path: &AssetPath) -> StorageResult<StoredAsset> {
        if self.fail_upload {
            return Err(StorageError::upload_failed("disk full"));
        }

        let key = path.video_key();
        self.uploads.lock().await.push((key.clone(), bytes.len()));
        Ok(StoredAsset {
            public_id: key.clone(),
            secure_url: format!("https://cdn.adreel.test/{key}"),
            thumbnail_url: format!("https://cdn.adreel.test/thumbs/{key}.jpg"),
        })
    }

    async fn signed_url(&self, public_id: &str, ttl: Duration) -> StorageResult<String> {
        Ok(format!(
            "https://cdn.adreel.test/{public_id}?sig=test&ttl={}",
            ttl.as_secs()
        ))
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    ledger: CreditLedger,
    generation: Arc<FakeGeneration>,
    orchestrator: Arc<PipelineOrchestrator>,
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        submit_base_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        poll_max_attempts: 20,
        ..PipelineConfig::default()
    }
}

fn harness(config: PipelineConfig, generation: FakeGeneration) -> Harness {
    harness_with_assets(config, generation, FakeAssets::default())
}

fn harness_with_assets(
    config: PipelineConfig,
    generation: FakeGeneration,
    assets: FakeAssets,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = CreditLedger::new(store.clone());
    let generation = Arc::new(generation);

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        store.clone(),
        ledger.clone(),
        generation.clone(),
        Arc::new(assets),
        NotificationHub::new(),
    ));

    Harness {
        store,
        ledger,
        generation,
        orchestrator,
    }
}

impl Harness {
    async fn seed_credits(&self, user_id: &str, amount: u32) {
        self.ledger
            .grant(user_id, amount, CreditTransactionType::Bonus, "Test grant")
            .await
            .expect("grant succeeds");
    }

    async fn debits_for(&self, user_id: &str) -> Vec<u32> {
        self.ledger
            .history(user_id)
            .await
            .expect("history")
            .iter()
            .filter(|t| t.tx_type == CreditTransactionType::Debit)
            .map(|t| t.amount)
            .collect()
    }

    async fn refunds_for_job(&self, job_id: &JobId) -> Vec<u32> {
        use adreel_store::LedgerStore;
        self.store
            .transactions_for_job(job_id)
            .await
            .expect("transactions")
            .iter()
            .filter(|t| t.tx_type == CreditTransactionType::Refund)
            .map(|t| t.amount)
            .collect()
    }
}

fn request() -> GenerationRequest {
    GenerationRequest::new(
        VideoStyle::ProductShowcase,
        "Meet the mug that keeps coffee hot for 12 hours.",
    )
    .with_visual_summary("matte black steel, copper rim")
}

/// A job persisted mid-generation, as a crashed worker would leave it.
async fn persist_generating_job(h: &Harness, user_id: &str, external_id: &str) -> JobId {
    let mut job = VideoJob::new(user_id, VideoStyle::ProductShowcase, "prompt", None);
    job.credits_used = 1;
    h.ledger
        .debit(user_id, 1, &job.id)
        .await
        .expect("debit succeeds");
    job.transition(JobStatus::Generating).expect("legal edge");
    job.record_external_job_id(external_id);
    job.updated_at = Utc::now() - chrono::Duration::seconds(600);
    h.store.insert_job(&job).await.expect("insert succeeds");
    job.id
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn completes_on_first_poll() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())]),
    );
    h.seed_credits("user-1", 1).await;
    let mut events = h.orchestrator.notifier().subscribe();

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.credits_used, 1);

    let done = h.orchestrator.drive(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.polls_used, 1);
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());

    let asset = done.asset.expect("asset recorded");
    assert_eq!(asset.public_id, format!("user-1/{}/video.mp4", done.id));
    assert!(asset.download_url.contains("sig=test"));
    assert!(asset.download_expires_at > Utc::now());

    // One debit of amount 1, no refund, balance spent
    assert_eq!(h.debits_for("user-1").await, vec![1]);
    assert!(h.refunds_for_job(&done.id).await.is_empty());
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 0);

    assert_eq!(h.generation.submit_count(), 1);
    assert_eq!(
        *h.generation.last_fetch_url.lock().await,
        Some("https://gen.test/a.mp4".to_string())
    );

    let event = events.recv().await.unwrap();
    assert_eq!(event.job_id, done.id);
    assert_eq!(event.status, JobStatus::Completed);
}

#[tokio::test]
async fn remote_error_fails_and_refunds() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::RemoteError(
            "model produced no output".into(),
        )]),
    );
    h.seed_credits("user-1", 1).await;
    let mut events = h.orchestrator.notifier().subscribe();

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.expect("error recorded");
    assert_eq!(error.code, JobErrorCode::GenerationIncomplete);
    assert!(error.message.contains("refunded"));

    // Debit then refund nets to zero
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);

    let event = events.recv().await.unwrap();
    assert_eq!(event.status, JobStatus::Failed);
    assert_eq!(
        event.error.expect("event carries error").code,
        JobErrorCode::GenerationIncomplete
    );
}

#[tokio::test]
async fn poll_budget_exhaustion_times_out() {
    let config = PipelineConfig {
        poll_max_attempts: 5,
        ..fast_config()
    };
    let h = harness(config, FakeGeneration::with_script(vec![PollStep::Pending]));
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.polls_used, 5);
    let error = failed.error.expect("error recorded");
    assert_eq!(error.code, JobErrorCode::Timeout);
    assert!(error.message.contains("timed out"));
    assert!(error.message.contains("refunded"));

    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
}

#[tokio::test]
async fn insufficient_credits_creates_no_job() {
    let h = harness(fast_config(), FakeGeneration::default());
    h.seed_credits("user-1", 1).await;
    // Prior spend drains the balance
    h.ledger.debit("user-1", 1, &JobId::new()).await.unwrap();

    let err = h
        .orchestrator
        .submit("user-1", &request())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ledger(LedgerError::InsufficientCredits { needed: 1, balance: 0 })
    ));

    // No job record, no external call, balance untouched
    assert!(h
        .orchestrator
        .jobs_for_user("user-1")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.generation.submit_count(), 0);
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 0);
}

#[tokio::test]
async fn transient_submission_failures_are_retried() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())])
            .failing_submits(2),
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let done = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(h.generation.submit_count(), 3);
}

#[tokio::test]
async fn submission_outage_fails_after_bounded_attempts() {
    let h = harness(
        fast_config(),
        FakeGeneration::default().failing_submits(100),
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(h.generation.submit_count(), 3);
    let error = failed.error.expect("error recorded");
    assert_eq!(error.code, JobErrorCode::ServiceUnavailable);

    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
}

#[tokio::test]
async fn rejected_submission_fails_without_retry() {
    let generation = FakeGeneration {
        reject_submission: true,
        ..Default::default()
    };
    let h = harness(fast_config(), generation);
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(h.generation.submit_count(), 1);
    assert_eq!(
        failed.error.expect("error recorded").code,
        JobErrorCode::GenerationIncomplete
    );
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
}

#[tokio::test]
async fn transient_poll_failure_burns_budget_and_continues() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![
            PollStep::Unavailable,
            PollStep::Running,
            PollStep::Done("https://gen.test/a.mp4".into()),
        ]),
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let done = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.polls_used, 3);
}

#[tokio::test]
async fn resumed_job_polls_persisted_external_id_without_resubmitting() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())]),
    );
    h.seed_credits("user-1", 1).await;

    let job_id = persist_generating_job(&h, "user-1", "ext-resume").await;

    let done = h.orchestrator.drive(&job_id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    // Resumed from the persisted external id: no second submission, no
    // second debit
    assert_eq!(h.generation.submit_count(), 0);
    assert_eq!(
        *h.generation.last_poll_id.lock().await,
        Some("ext-resume".to_string())
    );
    assert_eq!(h.debits_for("user-1").await, vec![1]);
}

#[tokio::test]
async fn stale_scan_resumes_abandoned_jobs() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())]),
    );
    h.seed_credits("user-1", 1).await;
    let job_id = persist_generating_job(&h, "user-1", "ext-stale").await;

    let runner = PipelineRunner::new(h.orchestrator.clone());
    assert_eq!(runner.scan_once().await.unwrap(), 1);

    // The drive runs in the background; wait for it to settle
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = h.orchestrator.job(&job_id).await.unwrap().expect("exists");
        if job.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never settled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A settled store has nothing left to resume
    assert_eq!(runner.scan_once().await.unwrap(), 0);
}

#[tokio::test]
async fn fresh_jobs_are_not_scanned() {
    let h = harness(fast_config(), FakeGeneration::default());
    h.seed_credits("user-1", 1).await;
    h.orchestrator.submit("user-1", &request()).await.unwrap();

    let runner = PipelineRunner::new(h.orchestrator.clone());
    assert_eq!(runner.scan_once().await.unwrap(), 0);
}

#[tokio::test]
async fn terminal_jobs_reject_further_transitions() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())]),
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let done = h.orchestrator.drive(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let err = h.orchestrator.cancel(&job.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transition(_)));

    // Nothing mutated, nothing refunded
    let stored = h.orchestrator.job(&job.id).await.unwrap().expect("exists");
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(h.refunds_for_job(&job.id).await.is_empty());
}

#[tokio::test]
async fn queued_job_can_be_cancelled_with_refund() {
    let h = harness(fast_config(), FakeGeneration::default());
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 0);

    let cancelled = h.orchestrator.cancel(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
    assert_eq!(h.refunds_for_job(&job.id).await, vec![1]);

    // Cancelling twice is an invalid transition and does not double-credit
    let err = h.orchestrator.cancel(&job.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transition(_)));
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
}

#[tokio::test]
async fn asset_fetch_failure_fails_and_refunds() {
    let generation = FakeGeneration {
        fetch_unavailable: true,
        poll_script: Mutex::new(
            vec![PollStep::Done("https://gen.test/a.mp4".into())].into(),
        ),
        ..Default::default()
    };
    let h = harness(fast_config(), generation);
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error.expect("error recorded").code,
        JobErrorCode::GenerationIncomplete
    );
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
}

#[tokio::test]
async fn done_without_asset_url_is_a_generation_failure() {
    let h = harness(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::DoneWithoutUrl]),
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error.expect("error recorded").code,
        JobErrorCode::GenerationIncomplete
    );
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
}

#[tokio::test]
async fn storage_upload_failure_fails_and_refunds() {
    let h = harness_with_assets(
        fast_config(),
        FakeGeneration::with_script(vec![PollStep::Done("https://gen.test/a.mp4".into())]),
        FakeAssets {
            fail_upload: true,
            ..Default::default()
        },
    );
    h.seed_credits("user-1", 1).await;

    let job = h.orchestrator.submit("user-1", &request()).await.unwrap();
    let failed = h.orchestrator.drive(&job.id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error.expect("error recorded").code,
        JobErrorCode::Internal
    );
    assert_eq!(h.refunds_for_job(&failed.id).await, vec![1]);
    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_debit() {
    let h = harness(fast_config(), FakeGeneration::default());
    h.seed_credits("user-1", 1).await;

    let bad = GenerationRequest::new(VideoStyle::ProductShowcase, "");
    let err = h.orchestrator.submit("user-1", &bad).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));

    assert_eq!(h.ledger.balance("user-1").await.unwrap(), 1);
    assert!(h
        .orchestrator
        .jobs_for_user("user-1")
        .await
        .unwrap()
        .is_empty());
}
