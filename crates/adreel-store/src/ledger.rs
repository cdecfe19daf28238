//! Credit ledger: atomic debit/refund/grant against a user's balance.
//!
//! Every balance mutation appends a transaction entry in the same atomic
//! unit of work as the balance write. Concurrent mutations for the same
//! user are serialized with optimistic locking: read the account, compute
//! the new balance, and write guarded by the version read, retrying with
//! backoff when another writer wins the race.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use adreel_models::{CreditTransaction, CreditTransactionType, JobId};

use crate::error::StoreError;
use crate::store::{CreditAccount, LedgerStore};

/// Maximum retries for atomic ledger operations (optimistic locking).
const MAX_LEDGER_RETRIES: u32 = 5;

/// Base delay for exponential backoff on retry (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient credits: need {needed}, have {balance}")]
    InsufficientCredits { needed: u32, balance: u32 },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Job {0} already has a refund")]
    DuplicateRefund(JobId),

    #[error("Ledger write lost {0} consecutive races, giving up")]
    Contention(u32),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// True when retrying the whole operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention(_))
            || matches!(self, LedgerError::Store(e) if e.is_retryable())
    }
}

/// Atomic credit operations over a `LedgerStore`.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Debit `amount` credits for a job.
    ///
    /// Fails with `InsufficientCredits` without writing anything when the
    /// balance cannot cover the amount. The balance decrement and the DEBIT
    /// entry are one atomic write.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: u32,
        job_id: &JobId,
    ) -> LedgerResult<CreditTransaction> {
        self.apply(user_id, |account| {
            if account.balance < amount {
                return Err(LedgerError::InsufficientCredits {
                    needed: amount,
                    balance: account.balance,
                });
            }
            let balance_after = account.balance - amount;
            Ok((
                balance_after,
                CreditTransaction::new(
                    user_id,
                    CreditTransactionType::Debit,
                    amount,
                    balance_after,
                    "Video generation",
                )
                .with_related_job(job_id.clone()),
            ))
        })
        .await
    }

    /// Refund a job's debit.
    ///
    /// Always succeeds for an existing user, except that a second refund
    /// for the same job is rejected with `DuplicateRefund` so a crashed and
    /// resumed worker cannot double-credit.
    pub async fn refund(
        &self,
        user_id: &str,
        amount: u32,
        job_id: &JobId,
        reason: &str,
    ) -> LedgerResult<CreditTransaction> {
        let reason = reason.to_string();
        // Checked again inside the retry loop: the refund-exists read and
        // the guarded write race only against writers that bump the account
        // version, so losing the race re-runs the check.
        self.apply(user_id, |account| {
            let balance_after = account.balance.saturating_add(amount);
            Ok((
                balance_after,
                CreditTransaction::new(
                    user_id,
                    CreditTransactionType::Refund,
                    amount,
                    balance_after,
                    format!("Refund: {reason}"),
                )
                .with_related_job(job_id.clone()),
            ))
        })
        .await
    }

    /// Grant credits (bonus or subscription cycle), creating the account on
    /// first grant.
    pub async fn grant(
        &self,
        user_id: &str,
        amount: u32,
        tx_type: CreditTransactionType,
        description: &str,
    ) -> LedgerResult<CreditTransaction> {
        debug_assert!(tx_type.is_credit(), "grants must be credit entries");

        for attempt in 0..MAX_LEDGER_RETRIES {
            let existing = self.store.get_account(user_id).await?;
            let (account, expected_version) = match existing {
                Some(acc) => {
                    let version = acc.version;
                    (acc, Some(version))
                }
                None => (CreditAccount::new(user_id), None),
            };

            let balance_after = account.balance.saturating_add(amount);
            let tx = CreditTransaction::new(user_id, tx_type, amount, balance_after, description);

            let mut updated = account;
            updated.balance = balance_after;

            match self
                .store
                .write_account_with_tx(&updated, expected_version, &tx)
                .await
            {
                Ok(()) => {
                    info!(user_id = %user_id, amount, balance = balance_after, "Granted credits");
                    return Ok(tx);
                }
                Err(e) if e.is_precondition_failed() || matches!(e, StoreError::AlreadyExists(_)) => {
                    debug!(user_id = %user_id, attempt = attempt + 1, "Grant lost a race, retrying");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention(MAX_LEDGER_RETRIES))
    }

    /// Point-in-time balance read; no side effects. Returns 0 for a user
    /// with no account yet.
    pub async fn balance(&self, user_id: &str) -> LedgerResult<u32> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|a| a.balance)
            .unwrap_or(0))
    }

    /// Full transaction history for a user, in creation order.
    pub async fn history(&self, user_id: &str) -> LedgerResult<Vec<CreditTransaction>> {
        Ok(self.store.transactions_for_user(user_id).await?)
    }

    /// Whether a refund entry already exists for this job.
    pub async fn has_refund(&self, job_id: &JobId) -> LedgerResult<bool> {
        Ok(self
            .store
            .transactions_for_job(job_id)
            .await?
            .iter()
            .any(|t| t.tx_type == CreditTransactionType::Refund))
    }

    /// Optimistic read-modify-write loop shared by debit and refund.
    ///
    /// `f` maps the current account to the new balance and the transaction
    /// to append; domain errors from `f` abort without retrying.
    async fn apply<F>(&self, user_id: &str, f: F) -> LedgerResult<CreditTransaction>
    where
        F: Fn(&CreditAccount) -> LedgerResult<(u32, CreditTransaction)>,
    {
        for attempt in 0..MAX_LEDGER_RETRIES {
            let account = self
                .store
                .get_account(user_id)
                .await?
                .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;

            let (balance_after, tx) = f(&account)?;

            // Duplicate-refund guard, re-checked on every attempt
            if tx.tx_type == CreditTransactionType::Refund {
                if let Some(job_id) = &tx.related_job_id {
                    if self.has_refund(job_id).await? {
                        return Err(LedgerError::DuplicateRefund(job_id.clone()));
                    }
                }
            }

            let expected_version = account.version;
            let mut updated = account;
            updated.balance = balance_after;

            match self
                .store
                .write_account_with_tx(&updated, Some(expected_version), &tx)
                .await
            {
                Ok(()) => {
                    info!(
                        user_id = %user_id,
                        tx_type = tx.tx_type.as_str(),
                        amount = tx.amount,
                        balance = balance_after,
                        "Applied ledger entry"
                    );
                    return Ok(tx);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        user_id = %user_id,
                        attempt = attempt + 1,
                        "Ledger write precondition failed, retrying"
                    );
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Ledger write failed");
                    return Err(e.into());
                }
            }
        }

        warn!(
            user_id = %user_id,
            retries = MAX_LEDGER_RETRIES,
            "Ledger operation failed after retries"
        );
        Err(LedgerError::Contention(MAX_LEDGER_RETRIES))
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn ledger() -> (CreditLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CreditLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_grant_creates_account() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 3, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();
        assert_eq!(ledger.balance("user-1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_debit_and_balance() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 2, CreditTransactionType::SubscriptionCredit, "Monthly credits")
            .await
            .unwrap();

        let job_id = JobId::new();
        let tx = ledger.debit("user-1", 1, &job_id).await.unwrap();
        assert_eq!(tx.amount, 1);
        assert_eq!(tx.balance_after, 1);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits_writes_nothing() {
        let (ledger, store) = ledger();
        ledger
            .grant("user-1", 1, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();

        let job_id = JobId::new();
        let err = ledger.debit("user-1", 2, &job_id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits { needed: 2, balance: 1 }
        ));
        assert_eq!(ledger.balance("user-1").await.unwrap(), 1);
        assert!(store.transactions_for_job(&job_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debit_unknown_user() {
        let (ledger, _) = ledger();
        let err = ledger.debit("ghost", 1, &JobId::new()).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn test_refund_nets_to_zero() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 1, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();

        let job_id = JobId::new();
        ledger.debit("user-1", 1, &job_id).await.unwrap();
        let refund = ledger
            .refund("user-1", 1, &job_id, "generation failed")
            .await
            .unwrap();

        assert_eq!(refund.amount, 1);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_refund_rejected() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 1, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();

        let job_id = JobId::new();
        ledger.debit("user-1", 1, &job_id).await.unwrap();
        ledger
            .refund("user-1", 1, &job_id, "generation failed")
            .await
            .unwrap();

        let err = ledger
            .refund("user-1", 1, &job_id, "generation failed")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRefund(_)));
        // Not double-credited
        assert_eq!(ledger.balance("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_balance_after_tracks_creation_order() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 5, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();
        let job_a = JobId::new();
        let job_b = JobId::new();
        ledger.debit("user-1", 1, &job_a).await.unwrap();
        ledger.debit("user-1", 1, &job_b).await.unwrap();
        ledger.refund("user-1", 1, &job_a, "failed").await.unwrap();

        let history = ledger.history("user-1").await.unwrap();
        let balances: Vec<u32> = history.iter().map(|t| t.balance_after).collect();
        assert_eq!(balances, vec![5, 4, 3, 4]);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overspend() {
        let (ledger, _) = ledger();
        ledger
            .grant("user-1", 5, CreditTransactionType::Bonus, "Welcome bonus")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.debit("user-1", 1, &JobId::new()).await
            }));
        }

        let mut ok = 0u32;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientCredits { .. }) | Err(LedgerError::Contention(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // No lost updates: every successful debit is reflected in the
        // balance, and the account can never overspend.
        assert!(ok <= 5);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 5 - ok);

        let debits = ledger
            .history("user-1")
            .await
            .unwrap()
            .iter()
            .filter(|t| t.tx_type == CreditTransactionType::Debit)
            .count() as u32;
        assert_eq!(debits, ok);
    }
}
