//! Ordered hand-off of prepared batches to the writer.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use parking_lot::Mutex;

use crate::{
    batch::{BatchKey, Watermark},
    error::Result,
    observability::log_debug,
    registry::BatchRegistry,
};

/// How a caller wants to take part in flushing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// Skip when another thread is already flushing.
    Opportunistic,
    /// Wait for the flush lock and drain whatever is admissible.
    Blocking,
}

/// Serializes writer calls for one sink.
///
/// Exactly one thread at a time runs the writer. `active_flush` is only a hint
/// that lets producers return early instead of queueing on the lock while
/// another thread drains; exclusion comes from `flush_lock` alone. A batch
/// that becomes ready while its would-be flusher skipped is written by the
/// next flush or, at the latest, by the blocking flush during finalize.
#[derive(Debug, Default)]
pub struct FlushSequencer {
    flush_lock: Mutex<()>,
    active_flush: AtomicBool,
}

/// Clears `active_flush` on every exit path, including writer errors.
struct ActiveFlush<'a>(&'a AtomicBool);

impl<'a> ActiveFlush<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ActiveFlush<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of one flush call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Batches handed to the writer.
    pub flushed: usize,
    /// Whether the call returned early because another thread was flushing.
    pub skipped: bool,
}

impl FlushSequencer {
    /// Create an idle sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a thread currently holds the flush lock. Advisory only.
    pub fn is_flushing(&self) -> bool {
        self.active_flush.load(Ordering::Acquire)
    }

    /// Write prepared batches in key order until the head of the prepared map
    /// is missing, pending, or not admitted by `watermark`.
    ///
    /// `write` is never invoked concurrently with itself for the same
    /// sequencer. The registry lock is released around each `write` call.
    ///
    /// # Errors
    /// The first error returned by `write` is propagated; the batch being
    /// written is lost and the sink must be treated as failed.
    pub fn flush<P, W>(
        &self,
        registry: &BatchRegistry<P>,
        watermark: Watermark,
        mode: FlushMode,
        mut write: W,
    ) -> Result<FlushReport>
    where
        W: FnMut(BatchKey, P) -> Result<()>,
    {
        if mode == FlushMode::Opportunistic && self.is_flushing() {
            return Ok(FlushReport {
                flushed: 0,
                skipped: true,
            });
        }

        let _lock = self.flush_lock.lock();
        let _active = ActiveFlush::enter(&self.active_flush);
        let mut flushed = 0;
        while let Some((key, prepared)) = registry.pop_ready_below(watermark) {
            let started = Instant::now();
            write(key, prepared)?;
            flushed += 1;
            log_debug!(
                component = "flush",
                event = "batch_flushed",
                key = %key,
                elapsed_us = started.elapsed().as_micros() as u64,
            );
        }
        Ok(FlushReport {
            flushed,
            skipped: false,
        })
    }
}
