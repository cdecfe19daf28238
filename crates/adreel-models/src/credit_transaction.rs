//! Credit transaction data models.
//!
//! Each balance mutation appends one of these records. The log is
//! append-only: entries are never mutated or deleted, and `balance_after`
//! is the authoritative audit snapshot of the account immediately after
//! the entry was applied.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobId;

/// Type of credit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    /// Credit spent on a generation job
    Debit,
    /// Compensating entry reversing a debit for a failed or cancelled job
    Refund,
    /// Promotional or manual grant
    Bonus,
    /// Credits granted by a subscription cycle
    SubscriptionCredit,
}

impl CreditTransactionType {
    /// Returns the transaction type as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
            Self::SubscriptionCredit => "subscription_credit",
        }
    }

    /// Returns a human-readable label for the transaction type.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Debit => "Debit",
            Self::Refund => "Refund",
            Self::Bonus => "Bonus",
            Self::SubscriptionCredit => "Subscription Credit",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(Self::Debit),
            "refund" => Some(Self::Refund),
            "bonus" => Some(Self::Bonus),
            "subscription_credit" => Some(Self::SubscriptionCredit),
            _ => None,
        }
    }

    /// Whether this entry increases the balance.
    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::Debit)
    }
}

/// An append-only credit ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreditTransaction {
    /// Unique identifier for this transaction (UUID)
    pub id: String,

    /// Account the entry applies to
    pub user_id: String,

    /// Type of operation
    pub tx_type: CreditTransactionType,

    /// Number of credits moved
    pub amount: u32,

    /// Account balance immediately after applying this entry
    pub balance_after: u32,

    /// Job this entry belongs to (debits and refunds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_job_id: Option<JobId>,

    /// Human-readable description of the operation
    pub description: String,

    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a new transaction entry.
    pub fn new(
        user_id: impl Into<String>,
        tx_type: CreditTransactionType,
        amount: u32,
        balance_after: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            tx_type,
            amount,
            balance_after,
            related_job_id: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Set the related job ID.
    pub fn with_related_job(mut self, job_id: JobId) -> Self {
        self.related_job_id = Some(job_id);
        self
    }
}
