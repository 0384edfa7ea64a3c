use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_processed: AtomicU64,
    bytes_transferred: AtomicU64,
    batches_dispatched: AtomicU64,
    chunks_created: AtomicU64,
    flushes: AtomicU64,
}

/// Counters shared between a copy session and whoever reports on it.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rows_processed: u64,
    pub bytes_transferred: u64,
    pub batches_dispatched: u64,
    pub chunks_created: u64,
    pub flushes: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_rows(&self, count: u64) {
        self.inner.rows_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_bytes(&self, count: u64) {
        self.inner
            .bytes_transferred
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_dispatched
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_chunks_created(&self, count: u64) {
        self.inner.chunks_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self, count: u64) {
        self.inner.flushes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_processed: self.inner.rows_processed.load(Ordering::Relaxed),
            bytes_transferred: self.inner.bytes_transferred.load(Ordering::Relaxed),
            batches_dispatched: self.inner.batches_dispatched.load(Ordering::Relaxed),
            chunks_created: self.inner.chunks_created.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
