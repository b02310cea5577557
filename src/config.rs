use std::time::Duration;

/// Tuning for the recovery sweep.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Delay between two sweeps.
    pub interval: Duration,
    /// Maximum candidates picked up per sweep.
    pub batch_size: usize,
    /// Maximum confirms in flight against the PSP during a sweep.
    pub concurrency: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(180),
            batch_size: 10,
            concurrency: 2,
        }
    }
}

/// Connection settings for the Toss Payments confirm API.
#[derive(Debug, Clone)]
pub struct PspConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
    /// Retries after the first attempt for retryable errors.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for PspConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tosspayments.com".to_string(),
            secret_key: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }
}
