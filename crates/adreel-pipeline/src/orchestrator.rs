//! Pipeline orchestration.
//!
//! Drives one job from `Queued` to a terminal state, exactly once,
//! regardless of process restarts. All state lives in the store; every
//! write is a versioned compare-and-swap, so when two workers race on the
//! same job (original plus resumed), exactly one applies each transition
//! and the other aborts without corrupting anything.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use validator::Validate;

use adreel_genclient::{GenerationClient, RemoteJobState};
use adreel_models::{
    compose_prompt, AssetInfo, GenerationRequest, JobError, JobId, JobStatus, VideoJob,
};
use adreel_storage::{AssetPath, AssetStore};
use adreel_store::{CreditLedger, JobStore, LedgerError};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::notify::NotificationHub;
use crate::retry::{retry_async, RetryConfig};

/// Drives video generation jobs through submission, polling,
/// materialization, and terminal resolution.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    jobs: Arc<dyn JobStore>,
    ledger: CreditLedger,
    generation: Arc<dyn GenerationClient>,
    assets: Arc<dyn AssetStore>,
    notifier: NotificationHub,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator. All collaborators are injected; nothing
    /// global is touched.
    pub fn new(
        config: PipelineConfig,
        jobs: Arc<dyn JobStore>,
        ledger: CreditLedger,
        generation: Arc<dyn GenerationClient>,
        assets: Arc<dyn AssetStore>,
        notifier: NotificationHub,
    ) -> Self {
        Self {
            config,
            jobs,
            ledger,
            generation,
            assets,
            notifier,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn notifier(&self) -> &NotificationHub {
        &self.notifier
    }

    /// Accept a confirmed generation request: debit one credit and create
    /// the job record in `Queued`.
    ///
    /// `InsufficientCredits` fails the whole operation before any job
    /// record or external call exists. The returned snapshot is what the
    /// API layer serializes; driving to a terminal state happens in the
    /// background via [`drive`](Self::drive).
    pub async fn submit(
        &self,
        user_id: &str,
        request: &GenerationRequest,
    ) -> PipelineResult<VideoJob> {
        request
            .validate()
            .map_err(|e| PipelineError::invalid_request(e.to_string()))?;

        let prompt = compose_prompt(
            request.style,
            &request.script,
            request.product_visual_summary.as_deref(),
        );
        let mut job = VideoJob::new(
            user_id,
            request.style,
            prompt,
            request.reference_image_url.clone(),
        );

        self.ledger
            .debit(user_id, self.config.credits_per_video, &job.id)
            .await?;
        job.credits_used = self.config.credits_per_video;

        if let Err(e) = self.jobs.insert_job(&job).await {
            // The debit already happened; compensate before surfacing.
            error!(job_id = %job.id, error = %e, "Failed to persist new job, refunding debit");
            self.issue_refund(&job).await;
            return Err(e.into());
        }

        metrics::record_submitted();
        info!(
            job_id = %job.id,
            user_id = %user_id,
            style = %request.style,
            "Queued video generation job"
        );
        Ok(job)
    }

    /// Drive a job from its persisted state to a terminal state.
    ///
    /// Re-entrant: a resumed worker enters at whatever step the persisted
    /// status implies, and a persisted `external_job_id` is never
    /// re-submitted. Job-level failures funnel into the single failure
    /// resolution path; ownership races abort without writing.
    pub async fn drive(&self, job_id: &JobId) -> PipelineResult<VideoJob> {
        let mut job = self.load(job_id).await?;
        debug!(job_id = %job.id, status = %job.status, "Driving job");

        loop {
            let step = match job.status {
                JobStatus::Queued => self.step_submit(&mut job).await,
                JobStatus::Generating => self.step_poll(&mut job).await,
                JobStatus::Processing => self.step_materialize(&mut job).await,
                _ => return Ok(job),
            };

            if let Err(e) = step {
                if e.aborts_drive() {
                    error!(
                        job_id = %job.id,
                        error = %e,
                        "Aborting job drive without resolution"
                    );
                    return Err(e);
                }
                return self.resolve_failure(job, e).await;
            }
        }
    }

    /// Cancel a job. Legal only while `Queued`; once submitted upstream
    /// the attempt surfaces `InvalidTransition`.
    pub async fn cancel(&self, job_id: &JobId) -> PipelineResult<VideoJob> {
        let mut job = self.load(job_id).await?;
        job.transition(JobStatus::Cancelled)?;
        self.persist(&mut job).await?;
        self.issue_refund(&job).await;
        info!(job_id = %job.id, "Cancelled job");
        Ok(job)
    }

    /// Read a job record.
    pub async fn job(&self, job_id: &JobId) -> PipelineResult<Option<VideoJob>> {
        Ok(self.jobs.get_job(job_id).await?)
    }

    /// Jobs owned by a user, newest first.
    pub async fn jobs_for_user(&self, user_id: &str) -> PipelineResult<Vec<VideoJob>> {
        Ok(self.jobs.jobs_for_user(user_id).await?)
    }

    /// Non-terminal jobs that have gone quiet past the staleness threshold.
    pub async fn stale_jobs(&self) -> PipelineResult<Vec<VideoJob>> {
        Ok(self
            .jobs
            .stale_jobs(Utc::now(), self.config.stale_after.as_secs() as i64)
            .await?)
    }

    // =========================================================================
    // Pipeline steps
    // =========================================================================

    /// Step 1: submit to the generation service and move to `Generating`.
    ///
    /// Transient upstream failures are retried with exponential backoff up
    /// to the configured attempt bound; a rejected submission is not.
    async fn step_submit(&self, job: &mut VideoJob) -> PipelineResult<()> {
        if job.external_job_id.is_none() {
            let retry = RetryConfig::new("generation_submit")
                .with_max_retries(self.config.submit_attempts.saturating_sub(1))
                .with_base_delay(self.config.submit_base_delay);

            let external_id = retry_async(
                &retry,
                || async {
                    self.generation
                        .submit(&job.prompt, job.reference_image_url.as_deref())
                        .await
                },
                |e| e.is_retryable(),
            )
            .await?;

            job.record_external_job_id(external_id);
        }

        job.transition(JobStatus::Generating)?;
        self.persist(job).await?;
        info!(
            job_id = %job.id,
            external_job_id = job.external_job_id.as_deref().unwrap_or(""),
            "Submitted to generation service"
        );
        Ok(())
    }

    /// Step 2: poll until the service settles or the budget runs out.
    ///
    /// Each consumed attempt is persisted before the poll, so the budget
    /// survives crashes and the write doubles as the liveness heartbeat.
    /// Transient poll failures burn budget instead of retrying forever.
    async fn step_poll(&self, job: &mut VideoJob) -> PipelineResult<()> {
        let external_id = job
            .external_job_id
            .clone()
            .ok_or(PipelineError::MissingExternalJobId)?;

        while job.polls_used < self.config.poll_max_attempts {
            job.record_poll();
            self.persist(job).await?;

            match self.generation.poll(&external_id).await {
                Ok(poll) => match poll.state {
                    RemoteJobState::Done => {
                        job.transition(JobStatus::Processing)?;
                        self.persist(job).await?;
                        return Ok(());
                    }
                    RemoteJobState::Error => {
                        return Err(PipelineError::RemoteGenerationFailed(
                            poll.error.unwrap_or_else(|| "no detail".to_string()),
                        ));
                    }
                    RemoteJobState::Pending | RemoteJobState::Running => {
                        debug!(
                            job_id = %job.id,
                            state = poll.state.as_str(),
                            polls = job.polls_used,
                            "Generation still in progress"
                        );
                    }
                },
                Err(e) if e.is_retryable() => {
                    warn!(job_id = %job.id, error = %e, "Poll failed, will retry");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        Err(PipelineError::PollBudgetExhausted {
            attempts: job.polls_used,
        })
    }

    /// Step 3: fetch the produced asset, re-upload into durable storage,
    /// mint the signed download URL, and complete the job.
    ///
    /// The service's asset URL is short-lived and deliberately not
    /// persisted; a resumed worker re-polls for a fresh one.
    async fn step_materialize(&self, job: &mut VideoJob) -> PipelineResult<()> {
        let external_id = job
            .external_job_id
            .clone()
            .ok_or(PipelineError::MissingExternalJobId)?;

        let poll = self.generation.poll(&external_id).await?;
        let asset_url = match poll.state {
            RemoteJobState::Done => poll.asset_url.ok_or(PipelineError::MissingAssetUrl)?,
            RemoteJobState::Error => {
                return Err(PipelineError::RemoteGenerationFailed(
                    poll.error.unwrap_or_else(|| "no detail".to_string()),
                ));
            }
            state => {
                return Err(PipelineError::RemoteGenerationFailed(format!(
                    "service reported {} after completion",
                    state.as_str()
                )));
            }
        };

        let bytes = self.generation.fetch(&asset_url).await?;

        let path = AssetPath::new(job.user_id.clone(), job.id.as_str());
        let stored = self.assets.upload(bytes, &path).await?;
        let download_url = self
            .assets
            .signed_url(&stored.public_id, self.config.download_ttl)
            .await?;

        job.asset = Some(AssetInfo {
            public_id: stored.public_id,
            secure_url: stored.secure_url,
            thumbnail_url: stored.thumbnail_url,
            download_url,
            download_expires_at: Utc::now()
                + chrono::Duration::seconds(self.config.download_ttl.as_secs() as i64),
        });
        job.transition(JobStatus::Completed)?;
        self.persist(job).await?;

        metrics::record_completed();
        info!(job_id = %job.id, "Job completed");
        self.notifier.publish(job);
        Ok(())
    }

    /// Single failure-resolution exit path, reachable from any step.
    ///
    /// Classifies the underlying failure into a user-facing message,
    /// applies the guarded `Failed` transition, and issues the compensating
    /// refund at most once. A failed refund must not fail the resolution:
    /// it is logged and counted as a ledger discrepancy.
    async fn resolve_failure(
        &self,
        mut job: VideoJob,
        err: PipelineError,
    ) -> PipelineResult<VideoJob> {
        let code = err.classify();
        warn!(
            job_id = %job.id,
            code = code.as_str(),
            error = %err,
            "Resolving job failure"
        );

        let mut message = code.user_message().to_string();
        if job.credits_used > 0 {
            message.push_str(" Your credit has been refunded.");
        }
        job.error = Some(JobError::new(code, message));

        if let Err(t) = job.transition(JobStatus::Failed) {
            // Another worker already resolved this job.
            error!(job_id = %job.id, error = %t, "Job already terminal while resolving failure");
            return Err(t.into());
        }
        self.persist(&mut job).await?;

        metrics::record_failed(code.as_str());
        self.issue_refund(&job).await;
        self.notifier.publish(&job);
        Ok(job)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load(&self, job_id: &JobId) -> PipelineResult<VideoJob> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.clone()))
    }

    /// Persist the job with its compare-and-swap guard. A lost race means
    /// another worker owns the job's progression now.
    async fn persist(&self, job: &mut VideoJob) -> PipelineResult<()> {
        match self.jobs.update_job(job).await {
            Ok(stored) => {
                *job = stored;
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => Err(PipelineError::conflict(format!(
                "job {} was updated by another worker",
                job.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Issue the compensating refund for a debited job, at most once.
    ///
    /// Never fails the caller: the job outcome stands even when the ledger
    /// write does not, and the discrepancy becomes an operational alert.
    async fn issue_refund(&self, job: &VideoJob) {
        if job.credits_used == 0 {
            return;
        }

        match self.ledger.has_refund(&job.id).await {
            Ok(true) => {
                debug!(job_id = %job.id, "Refund already issued");
                return;
            }
            Ok(false) => {}
            // Fall through: the ledger rejects duplicates on its own.
            Err(e) => warn!(job_id = %job.id, error = %e, "Refund lookup failed"),
        }

        let reason = job
            .error
            .as_ref()
            .map(|e| e.code.as_str())
            .unwrap_or("cancelled");

        match self
            .ledger
            .refund(&job.user_id, job.credits_used, &job.id, reason)
            .await
        {
            Ok(_) => {
                metrics::record_refund();
                info!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    credits = job.credits_used,
                    "Refunded credits"
                );
            }
            Err(LedgerError::DuplicateRefund(_)) => {
                debug!(job_id = %job.id, "Refund already issued");
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    credits = job.credits_used,
                    error = %e,
                    "Refund failed, ledger discrepancy requires attention"
                );
                metrics::record_refund_failure();
            }
        }
    }
}
