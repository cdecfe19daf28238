//! In-memory store implementation.
//!
//! Reference implementation of the store traits behind a single mutex, so
//! `write_account_with_tx` is trivially atomic. Used by tests and the dev
//! worker binary; a durable deployment implements the same traits over its
//! database of choice.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use adreel_models::{CreditTransaction, JobId, VideoJob};

use crate::error::{StoreError, StoreResult};
use crate::store::{CreditAccount, JobStore, LedgerStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, VideoJob>,
    accounts: HashMap<String, CreditAccount>,
    transactions: Vec<CreditTransaction>,
}

/// In-memory `JobStore` + `LedgerStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &VideoJob) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::already_exists(format!("job {}", job.id)));
        }
        let mut stored = job.clone();
        stored.version = 1;
        inner.jobs.insert(stored.id.as_str().to_string(), stored);
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<VideoJob>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(id.as_str()).cloned())
    }

    async fn update_job(&self, job: &VideoJob) -> StoreResult<VideoJob> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .jobs
            .get_mut(job.id.as_str())
            .ok_or_else(|| StoreError::not_found(format!("job {}", job.id)))?;

        if stored.version != job.version {
            return Err(StoreError::precondition_failed(format!(
                "job {} version {} != expected {}",
                job.id, stored.version, job.version
            )));
        }

        *stored = job.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn jobs_for_user(&self, user_id: &str) -> StoreResult<Vec<VideoJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn stale_jobs(
        &self,
        now: DateTime<Utc>,
        threshold_secs: i64,
    ) -> StoreResult<Vec<VideoJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| j.is_stale(now, threshold_secs))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(jobs)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_account(&self, user_id: &str) -> StoreResult<Option<CreditAccount>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(user_id).cloned())
    }

    async fn write_account_with_tx(
        &self,
        account: &CreditAccount,
        expected_version: Option<u64>,
        tx: &CreditTransaction,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;

        match (inner.accounts.get(&account.user_id), expected_version) {
            (Some(_), None) => {
                return Err(StoreError::already_exists(format!(
                    "account {}",
                    account.user_id
                )));
            }
            (Some(existing), Some(expected)) if existing.version != expected => {
                return Err(StoreError::precondition_failed(format!(
                    "account {} version {} != expected {}",
                    account.user_id, existing.version, expected
                )));
            }
            (None, Some(_)) => {
                return Err(StoreError::not_found(format!("account {}", account.user_id)));
            }
            _ => {}
        }

        let mut stored = account.clone();
        stored.version = expected_version.unwrap_or(0) + 1;
        stored.updated_at = Utc::now();
        inner.accounts.insert(stored.user_id.clone(), stored);
        inner.transactions.push(tx.clone());
        Ok(())
    }

    async fn transactions_for_user(&self, user_id: &str) -> StoreResult<Vec<CreditTransaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transactions_for_job(&self, job_id: &JobId) -> StoreResult<Vec<CreditTransaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.related_job_id.as_ref() == Some(job_id))
            .cloned()
            .collect())
    }
}
