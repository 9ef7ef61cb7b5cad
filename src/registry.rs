//! Shared registry of finished batches.
//!
//! Two ordered maps live behind one mutex: *raw* batches that still have to
//! be repartitioned, and *prepared* batches waiting for the flush sequencer.
//! Every operation holds the lock only around map mutation, except the
//! repartition merge loop, which must not interleave with another pass over
//! the same prefix.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::{
    batch::{BatchIndex, BatchKey, Watermark},
    collection::RowCollection,
    error::{BatchStage, CopyError, Result},
    repartition::{self, RepartitionOutcome},
};

/// Entry of the prepared map.
#[derive(Debug)]
pub enum PreparedSlot<P> {
    /// The key is reserved but preparation has not finished.
    Pending,
    /// Ready to be written.
    Ready(P),
}

#[derive(Debug)]
struct RegistryState<P> {
    raw: BTreeMap<BatchIndex, RowCollection>,
    prepared: BTreeMap<BatchKey, PreparedSlot<P>>,
    /// Every scheduler index ever submitted, so a resubmission is caught even
    /// after the first copy was drained or flushed.
    submitted: BTreeSet<BatchIndex>,
    next_part: u64,
}

/// Process-wide state shared by every producer of one sink.
#[derive(Debug)]
pub struct BatchRegistry<P> {
    state: Mutex<RegistryState<P>>,
    total_rows: AtomicU64,
}

impl<P> Default for BatchRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> BatchRegistry<P> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                raw: BTreeMap::new(),
                prepared: BTreeMap::new(),
                submitted: BTreeSet::new(),
                next_part: 1,
            }),
            total_rows: AtomicU64::new(0),
        }
    }

    /// Park a finished batch until it can be repartitioned.
    ///
    /// # Errors
    /// [`CopyError::DuplicateBatchIndex`] if `index` was submitted before,
    /// whether or not it is still parked.
    pub fn submit_raw(&self, index: BatchIndex, collection: RowCollection) -> Result<()> {
        let mut state = self.state.lock();
        if !state.submitted.insert(index) {
            return Err(CopyError::DuplicateBatchIndex {
                key: BatchKey::whole(index),
                stage: BatchStage::Raw,
            });
        }
        state.raw.insert(index, collection);
        Ok(())
    }

    /// Insert a prepared batch, or reserve its key with [`PreparedSlot::Pending`].
    ///
    /// # Errors
    /// [`CopyError::DuplicateBatchIndex`] if `key` is present, or if `key` is
    /// a whole batch whose index was submitted before.
    pub fn submit_prepared(&self, key: BatchKey, slot: PreparedSlot<P>) -> Result<()> {
        let mut state = self.state.lock();
        let seen = key.is_whole() && !state.submitted.insert(key.index());
        if seen || state.prepared.contains_key(&key) {
            return Err(CopyError::DuplicateBatchIndex {
                key,
                stage: BatchStage::Prepared,
            });
        }
        state.prepared.insert(key, slot);
        Ok(())
    }

    /// Replace the placeholder reserved for `key` with its prepared value.
    pub fn complete_prepared(&self, key: BatchKey, prepared: P) {
        let mut state = self.state.lock();
        state.prepared.insert(key, PreparedSlot::Ready(prepared));
    }

    /// Remove and return every raw batch admitted by `watermark`, in index order.
    pub fn drain_raw_below(&self, watermark: Watermark) -> Vec<(BatchIndex, RowCollection)> {
        let mut state = self.state.lock();
        repartition::drain_below(&mut state.raw, watermark)
    }

    /// Run one repartition pass and reserve prepared keys for its output.
    ///
    /// Candidate counting, draining, merging and key reservation form a single
    /// critical section. The returned keys line up with the batches of
    /// [`RepartitionOutcome::Emitted`] and are already present in the prepared
    /// map as [`PreparedSlot::Pending`].
    pub fn repartition(
        &self,
        watermark: Watermark,
        target: usize,
        final_pass: bool,
    ) -> Result<(RepartitionOutcome, Vec<BatchKey>)> {
        let mut state = self.state.lock();
        let outcome = repartition::repartition(&mut state.raw, watermark, target, final_pass)?;
        let mut keys = Vec::new();
        if let RepartitionOutcome::Emitted {
            last_index,
            batches,
            ..
        } = &outcome
        {
            keys.reserve(batches.len());
            for _ in batches {
                let key = BatchKey::part(*last_index, state.next_part);
                state.next_part += 1;
                state.prepared.insert(key, PreparedSlot::Pending);
                keys.push(key);
            }
        }
        Ok((outcome, keys))
    }

    /// Pop the smallest prepared batch if it is admitted by `watermark` and
    /// ready. A pending smallest entry blocks everything behind it.
    pub fn pop_ready_below(&self, watermark: Watermark) -> Option<(BatchKey, P)> {
        let mut state = self.state.lock();
        let entry = state.prepared.first_entry()?;
        if !watermark.admits(entry.key().index()) {
            return None;
        }
        if matches!(entry.get(), PreparedSlot::Pending) {
            return None;
        }
        match entry.remove_entry() {
            (key, PreparedSlot::Ready(prepared)) => Some((key, prepared)),
            (_, PreparedSlot::Pending) => None,
        }
    }

    /// Add rows to the global total.
    pub fn add_rows(&self, rows: u64) {
        self.total_rows.fetch_add(rows, Ordering::AcqRel);
    }

    /// Rows accounted so far.
    pub fn total_rows(&self) -> u64 {
        self.total_rows.load(Ordering::Acquire)
    }

    /// Number of raw and prepared (including pending) entries.
    pub fn pending_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.raw.len(), state.prepared.len())
    }
}
