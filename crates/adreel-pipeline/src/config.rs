//! Pipeline configuration.

use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Credits debited per generation job
    pub credits_per_video: u32,
    /// Submission attempts against the generation service (including the
    /// first) before the job fails
    pub submit_attempts: u32,
    /// Base delay for exponential backoff between submission attempts
    pub submit_base_delay: Duration,
    /// Interval between status polls
    pub poll_interval: Duration,
    /// Total poll budget per job; exhausting it fails the job as timed out
    pub poll_max_attempts: u32,
    /// Validity window of the signed download URL
    pub download_ttl: Duration,
    /// Quiet time after which a non-terminal job is considered abandoned
    /// and eligible for the resume scan
    pub stale_after: Duration,
    /// Interval between resume scans
    pub resume_scan_interval: Duration,
    /// Maximum jobs driven concurrently by one runner
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            credits_per_video: 1,
            submit_attempts: 3,
            submit_base_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(10),
            poll_max_attempts: 120, // ~20 minutes at the default interval
            download_ttl: Duration::from_secs(7 * 24 * 3600),
            stale_after: Duration::from_secs(300),
            resume_scan_interval: Duration::from_secs(30),
            max_concurrent_jobs: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            credits_per_video: env_parse("PIPELINE_CREDITS_PER_VIDEO", defaults.credits_per_video),
            submit_attempts: env_parse("PIPELINE_SUBMIT_ATTEMPTS", defaults.submit_attempts),
            submit_base_delay: Duration::from_millis(env_parse(
                "PIPELINE_SUBMIT_BASE_DELAY_MS",
                defaults.submit_base_delay.as_millis() as u64,
            )),
            poll_interval: Duration::from_secs(env_parse(
                "PIPELINE_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            poll_max_attempts: env_parse("PIPELINE_POLL_MAX_ATTEMPTS", defaults.poll_max_attempts),
            download_ttl: Duration::from_secs(env_parse(
                "PIPELINE_DOWNLOAD_TTL_SECS",
                defaults.download_ttl.as_secs(),
            )),
            stale_after: Duration::from_secs(env_parse(
                "PIPELINE_STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )),
            resume_scan_interval: Duration::from_secs(env_parse(
                "PIPELINE_RESUME_SCAN_SECS",
                defaults.resume_scan_interval.as_secs(),
            )),
            max_concurrent_jobs: env_parse(
                "PIPELINE_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            ),
            shutdown_timeout: Duration::from_secs(env_parse(
                "PIPELINE_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = PipelineConfig::default();
        assert_eq!(config.credits_per_video, 1);
        assert_eq!(config.submit_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_max_attempts, 120);
        assert_eq!(config.download_ttl, Duration::from_secs(7 * 24 * 3600));
    }
}
