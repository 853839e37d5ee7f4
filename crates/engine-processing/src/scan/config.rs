use engine_core::retry::RetryPolicy;

/// Configuration for inventory scan workers.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Rows per page and per checkpoint.
    pub batch_size: usize,

    /// Policy for transient read failures.
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            retry: RetryPolicy::for_database(),
        }
    }
}

impl ScanConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
