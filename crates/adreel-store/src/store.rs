//! Store traits: the durable-backend seam.
//!
//! Both traits use versioned compare-and-swap writes: every record carries
//! a `version`, a write names the version it read, and the backend rejects
//! the write with `PreconditionFailed` if another writer got there first.
//! This replaces a server-side update-time precondition with the same
//! semantics, and is what linearizes status transitions on a single job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adreel_models::{CreditTransaction, JobId, VideoJob};

use crate::error::StoreResult;

/// A user's credit account. The balance is mutated only through
/// `LedgerStore::write_account_with_tx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: String,
    pub balance: u32,
    /// Record version for optimistic-concurrency writes
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create a fresh account with a zero balance.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Durable storage for video jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `AlreadyExists` on id collision.
    async fn insert_job(&self, job: &VideoJob) -> StoreResult<()>;

    /// Fetch a job by id.
    async fn get_job(&self, id: &JobId) -> StoreResult<Option<VideoJob>>;

    /// Persist an updated job, guarded by `job.version` (the version the
    /// caller read). Returns the stored job with its version bumped.
    ///
    /// Fails with `PreconditionFailed` if another writer updated the record
    /// since the caller read it, and with `NotFound` if the job was never
    /// inserted.
    async fn update_job(&self, job: &VideoJob) -> StoreResult<VideoJob>;

    /// All jobs owned by a user, newest first.
    async fn jobs_for_user(&self, user_id: &str) -> StoreResult<Vec<VideoJob>>;

    /// Non-terminal jobs whose last update is older than `threshold_secs`.
    /// These are the candidates for the resume scan after a crash.
    async fn stale_jobs(
        &self,
        now: DateTime<Utc>,
        threshold_secs: i64,
    ) -> StoreResult<Vec<VideoJob>>;
}

/// Durable storage for credit accounts and the transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch an account by user id.
    async fn get_account(&self, user_id: &str) -> StoreResult<Option<CreditAccount>>;

    /// Atomically write the account and append `tx` in one unit of work:
    /// both happen or neither does.
    ///
    /// `expected_version` is the version the caller read, or `None` to
    /// create the account (failing with `AlreadyExists` if it is already
    /// there). A mismatch fails with `PreconditionFailed`.
    async fn write_account_with_tx(
        &self,
        account: &CreditAccount,
        expected_version: Option<u64>,
        tx: &CreditTransaction,
    ) -> StoreResult<()>;

    /// Transaction log for a user, in creation order.
    async fn transactions_for_user(&self, user_id: &str) -> StoreResult<Vec<CreditTransaction>>;

    /// Transactions related to a job, in creation order.
    async fn transactions_for_job(&self, job_id: &JobId) -> StoreResult<Vec<CreditTransaction>>;
}
