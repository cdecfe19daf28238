//! Pipeline metrics collection.
//!
//! Counters for job outcomes and ledger compensation. The refund-failure
//! counter is the operational alert for ledger discrepancies: a refund
//! that could not be issued after a failed job.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Jobs accepted into the pipeline.
    pub const JOBS_SUBMITTED_TOTAL: &str = "adreel_jobs_submitted_total";

    /// Jobs that reached `Completed`.
    pub const JOBS_COMPLETED_TOTAL: &str = "adreel_jobs_completed_total";

    /// Jobs that reached `Failed`, by error code.
    pub const JOBS_FAILED_TOTAL: &str = "adreel_jobs_failed_total";

    /// Refunds issued for failed or cancelled jobs.
    pub const REFUNDS_TOTAL: &str = "adreel_refunds_total";

    /// Refunds that could not be issued (ledger discrepancy).
    pub const REFUND_FAILURES_TOTAL: &str = "adreel_refund_failures_total";

    /// Stale jobs picked up by the resume scan.
    pub const JOBS_RESUMED_TOTAL: &str = "adreel_jobs_resumed_total";
}

pub fn record_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_failed(error_code: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "code" => error_code).increment(1);
}

pub fn record_refund() {
    counter!(names::REFUNDS_TOTAL).increment(1);
}

pub fn record_refund_failure() {
    counter!(names::REFUND_FAILURES_TOTAL).increment(1);
}

pub fn record_resumed() {
    counter!(names::JOBS_RESUMED_TOTAL).increment(1);
}
