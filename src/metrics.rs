//! Metrics surface for a batch copy sink.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

/// Snapshot of sink-level counters.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct CopyMetricsSnapshot {
    /// Raw batches handed to the registry for repartitioning.
    pub raw_batches_submitted: u64,
    /// Repartition passes that consumed raw batches.
    pub repartition_passes: u64,
    /// Repartition passes skipped because too few rows were available.
    pub repartition_deferrals: u64,
    /// Batches converted into the writer's prepared form.
    pub batches_prepared: u64,
    /// Rows contained in prepared batches.
    pub rows_prepared: u64,
    /// Flush attempts skipped because another thread was flushing.
    pub flush_skips: u64,
    /// Flush timings, when at least one batch was written.
    pub flush: Option<FlushMetricsSnapshot>,
}

/// Aggregated timings of `flush_batch` calls.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct FlushMetricsSnapshot {
    /// Number of batches written.
    pub flush_count: u64,
    /// Total elapsed time (microseconds) spent in the writer.
    pub total_us: u128,
    /// Longest single flush duration (microseconds).
    pub max_us: u64,
    /// Shortest single flush duration (microseconds).
    pub min_us: u64,
}

#[derive(Debug, Default)]
pub(crate) struct CopyMetrics {
    raw_batches_submitted: AtomicU64,
    repartition_passes: AtomicU64,
    repartition_deferrals: AtomicU64,
    batches_prepared: AtomicU64,
    rows_prepared: AtomicU64,
    flush_skips: AtomicU64,
    flush: FlushMetrics,
}

impl CopyMetrics {
    pub(crate) fn record_raw_submitted(&self) {
        self.raw_batches_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repartition_pass(&self) {
        self.repartition_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repartition_deferral(&self) {
        self.repartition_deferrals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prepared(&self, rows: usize) {
        self.batches_prepared.fetch_add(1, Ordering::Relaxed);
        self.rows_prepared.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_skip(&self) {
        self.flush_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, duration: Duration) {
        self.flush.record(duration);
    }

    pub(crate) fn snapshot(&self) -> CopyMetricsSnapshot {
        CopyMetricsSnapshot {
            raw_batches_submitted: self.raw_batches_submitted.load(Ordering::Relaxed),
            repartition_passes: self.repartition_passes.load(Ordering::Relaxed),
            repartition_deferrals: self.repartition_deferrals.load(Ordering::Relaxed),
            batches_prepared: self.batches_prepared.load(Ordering::Relaxed),
            rows_prepared: self.rows_prepared.load(Ordering::Relaxed),
            flush_skips: self.flush_skips.load(Ordering::Relaxed),
            flush: self.flush.snapshot(),
        }
    }
}

#[derive(Debug, Default)]
struct FlushMetrics {
    inner: Mutex<FlushMetricsState>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FlushMetricsState {
    flush_count: u64,
    total_us: u128,
    max_us: u64,
    min_us: u64,
}

impl FlushMetrics {
    fn record(&self, duration: Duration) {
        let mut guard = self.inner.lock();
        guard.flush_count = guard.flush_count.saturating_add(1);
        let micros = duration.as_micros();
        guard.total_us = guard.total_us.saturating_add(micros);
        let us = u64::try_from(micros).unwrap_or(u64::MAX);
        if guard.flush_count == 1 || us < guard.min_us {
            guard.min_us = us;
        }
        if us > guard.max_us {
            guard.max_us = us;
        }
    }

    fn snapshot(&self) -> Option<FlushMetricsSnapshot> {
        let guard = self.inner.lock();
        if guard.flush_count == 0 {
            return None;
        }
        Some(FlushMetricsSnapshot {
            flush_count: guard.flush_count,
            total_us: guard.total_us,
            max_us: guard.max_us,
            min_us: guard.min_us,
        })
    }
}
