//! Durable state for the AdReel pipeline.
//!
//! This crate provides:
//! - The `JobStore` and `LedgerStore` traits: the seam any durable backend
//!   (relational, document, KV) implements, with optimistic-concurrency
//!   writes guarded by a record version
//! - `MemoryStore`, the in-process reference implementation
//! - `CreditLedger`, atomic debit/refund/grant operations with an
//!   append-only transaction log

pub mod error;
pub mod ledger;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use ledger::{CreditLedger, LedgerError, LedgerResult};
pub use memory::MemoryStore;
pub use store::{CreditAccount, JobStore, LedgerStore};
