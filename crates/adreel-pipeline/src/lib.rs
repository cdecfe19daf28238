//! Video generation job pipeline.
//!
//! Takes a confirmed script, spends a credit, submits to the external
//! generation service, polls to completion, transfers the asset into
//! durable storage, and deterministically resolves every terminal state
//! (success, failure with refund, or timeout), surviving process restarts
//! by treating the durable store as the source of truth.

pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod runner;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use notify::{JobEvent, NotificationHub};
pub use orchestrator::PipelineOrchestrator;
pub use retry::{retry_async, FailureTracker, RetryConfig};
pub use runner::PipelineRunner;
