//! Pipeline runner.
//!
//! Owns the worker pool: spawns one lightweight task per job bounded by a
//! semaphore, and periodically scans the store for stale non-terminal jobs
//! to resume after a crash. The triggering caller gets its job snapshot
//! back immediately; everything else happens here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{error, info, warn};

use adreel_models::{GenerationRequest, JobId, VideoJob};

use crate::error::PipelineResult;
use crate::metrics;
use crate::orchestrator::PipelineOrchestrator;
use crate::retry::FailureTracker;

/// Consecutive scan failures to log before suppressing.
const MAX_LOGGED_SCAN_FAILURES: u32 = 3;

/// Background runner for the pipeline orchestrator.
pub struct PipelineRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    max_concurrent_jobs: usize,
}

impl PipelineRunner {
    /// Create a new runner around an orchestrator.
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        let max_concurrent_jobs = orchestrator.config().max_concurrent_jobs;
        let (shutdown, _) = tokio::sync::watch::channel(false);

        Self {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            shutdown,
            max_concurrent_jobs,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    /// Accept a request and hand the queued job to a background task.
    /// Returns as soon as the job record exists.
    pub async fn submit(
        &self,
        user_id: &str,
        request: &GenerationRequest,
    ) -> PipelineResult<VideoJob> {
        let job = self.orchestrator.submit(user_id, request).await?;
        self.spawn_drive(job.id.clone());
        Ok(job)
    }

    /// Spawn a background task driving one job to a terminal state.
    pub fn spawn_drive(&self, job_id: JobId) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed during shutdown
            };

            if let Err(e) = orchestrator.drive(&job_id).await {
                // Ownership races land here; the winning worker resolves
                // the job, so there is nothing more to do.
                warn!(job_id = %job_id, error = %e, "Job drive ended without resolution");
            }
        });
    }

    /// Run the resume-scan loop until shutdown, then drain in-flight jobs.
    pub async fn run(&self) {
        let scan_interval = self.orchestrator.config().resume_scan_interval;
        let shutdown_timeout = self.orchestrator.config().shutdown_timeout;
        info!(
            "Starting pipeline runner with {} max concurrent jobs (scan interval {:?})",
            self.max_concurrent_jobs, scan_interval
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = interval(scan_interval);
        let mut scan_failures = FailureTracker::new(MAX_LOGGED_SCAN_FAILURES);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping runner");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(resumed) => {
                            scan_failures.record_success();
                            if resumed > 0 {
                                info!("Resumed {} stale jobs", resumed);
                            }
                        }
                        Err(e) => {
                            if scan_failures.record_failure() {
                                error!("Stale job scan failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(shutdown_timeout, self.wait_for_jobs()).await;
        info!("Pipeline runner stopped");
    }

    /// Run a single resume scan, spawning a drive task per stale job.
    /// Returns the number of jobs resumed.
    pub async fn scan_once(&self) -> PipelineResult<u32> {
        let stale = self.orchestrator.stale_jobs().await?;
        let mut resumed = 0u32;

        for job in stale {
            info!(
                job_id = %job.id,
                status = %job.status,
                updated_at = %job.updated_at,
                "Resuming stale job"
            );
            metrics::record_resumed();
            self.spawn_drive(job.id);
            resumed += 1;
        }

        Ok(resumed)
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for all in-flight jobs to release their permits.
    async fn wait_for_jobs(&self) {
        loop {
            if self.semaphore.available_permits() == self.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
