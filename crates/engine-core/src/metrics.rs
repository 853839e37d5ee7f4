use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_scanned: AtomicU64,
    bytes_scanned: AtomicU64,
    batches_emitted: AtomicU64,
    checkpoints: AtomicU64,
    point_queries: AtomicU64,
    retry_count: AtomicU64,
    failure_count: AtomicU64,
}

/// Counters shared by every worker of one job item.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanMetricsSnapshot {
    pub rows_scanned: u64,
    pub bytes_scanned: u64,
    pub batches_emitted: u64,
    pub checkpoints: u64,
    pub point_queries: u64,
    pub retry_count: u64,
    pub failure_count: u64,
}

impl ScanMetrics {
    pub fn new() -> Self {
        ScanMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_rows(&self, count: u64) {
        self.inner.rows_scanned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_bytes(&self, count: u64) {
        self.inner.bytes_scanned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner.batches_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_checkpoints(&self) {
        self.inner.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_point_queries(&self) {
        self.inner.point_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScanMetricsSnapshot {
        ScanMetricsSnapshot {
            rows_scanned: self.inner.rows_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.inner.bytes_scanned.load(Ordering::Relaxed),
            batches_emitted: self.inner.batches_emitted.load(Ordering::Relaxed),
            checkpoints: self.inner.checkpoints.load(Ordering::Relaxed),
            point_queries: self.inner.point_queries.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}
