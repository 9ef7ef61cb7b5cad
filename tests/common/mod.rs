//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::{
    collections::BTreeSet,
    ops::Range,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use arrow::{
    array::{Array, Int64Array, RecordBatch},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use batchcopy::{
    BatchCopySink, BatchIndex, CopyError, CopyFunction, Result, RowCollection, Watermark,
};
use parking_lot::Mutex;

/// Single `v: Int64` column.
pub fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
}

/// Batch holding the values of `range` in order.
pub fn batch(range: Range<i64>) -> RecordBatch {
    RecordBatch::try_new(
        schema(),
        vec![Arc::new(Int64Array::from_iter_values(range))],
    )
    .expect("record batch")
}

/// Copy function that remembers every flushed batch and checks that flushes
/// never overlap.
#[derive(Default)]
pub struct Recorder {
    pub desired: Option<usize>,
    pub flushed: Mutex<Vec<Vec<i64>>>,
    pub finalize_calls: AtomicUsize,
    in_flush: AtomicBool,
}

impl Recorder {
    pub fn with_batch_size(desired: usize) -> Self {
        Recorder {
            desired: Some(desired),
            ..Recorder::default()
        }
    }

    /// Every flushed value in write order.
    pub fn values(&self) -> Vec<i64> {
        self.flushed.lock().concat()
    }

    pub fn batch_lens(&self) -> Vec<usize> {
        self.flushed.lock().iter().map(Vec::len).collect()
    }
}

impl CopyFunction for Recorder {
    type Prepared = Vec<i64>;

    fn desired_batch_size(&self) -> Option<usize> {
        self.desired
    }

    fn prepare_batch(&self, collection: RowCollection) -> Result<Vec<i64>> {
        let mut values = Vec::with_capacity(collection.len());
        for chunk in collection.chunks() {
            let column = chunk
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| CopyError::SchemaMismatch("expected int64".to_string()))?;
            values.extend_from_slice(column.values());
        }
        Ok(values)
    }

    fn flush_batch(&self, prepared: Vec<i64>) -> Result<()> {
        assert!(
            !self.in_flush.swap(true, Ordering::AcqRel),
            "flush_batch entered concurrently"
        );
        std::thread::yield_now();
        self.flushed.lock().push(prepared);
        self.in_flush.store(false, Ordering::Release);
        Ok(())
    }

    fn finalize(&self) -> Result<()> {
        self.finalize_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Hands out batch indexes and computes the watermark as the smallest index
/// not yet handed off to the sink.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    limit: BatchIndex,
}

struct SchedulerState {
    next: BatchIndex,
    in_flight: BTreeSet<BatchIndex>,
}

impl Scheduler {
    /// Scheduler for batch indexes `0..limit`.
    pub fn new(limit: BatchIndex) -> Self {
        Scheduler {
            state: Mutex::new(SchedulerState {
                next: 0,
                in_flight: BTreeSet::new(),
            }),
            limit,
        }
    }

    /// Claim the next unassigned index.
    pub fn claim(&self) -> Option<BatchIndex> {
        let mut state = self.state.lock();
        if state.next >= self.limit {
            return None;
        }
        let index = state.next;
        state.next += 1;
        state.in_flight.insert(index);
        Some(index)
    }

    /// Claim the index that follows `current` on the same producer.
    ///
    /// `current` stays in flight until [`Scheduler::retire`], so the returned
    /// watermark never admits a batch that has not reached the sink yet. When
    /// the input is exhausted the producer keeps a placeholder index past the
    /// end of the input, which never receives rows.
    pub fn advance(&self, current: BatchIndex) -> (BatchIndex, Watermark) {
        let mut state = self.state.lock();
        let next = state.next;
        state.next += 1;
        state.in_flight.insert(next);
        debug_assert!(state.in_flight.contains(&current));
        let watermark = state.in_flight.first().copied().unwrap_or(next);
        (next, Watermark::At(watermark))
    }

    /// Mark `index` as handed off.
    pub fn retire(&self, index: BatchIndex) {
        self.state.lock().in_flight.remove(&index);
    }

    /// Smallest index that may still receive rows.
    pub fn watermark(&self) -> Watermark {
        let state = self.state.lock();
        let min = state.in_flight.first().copied().unwrap_or(state.next);
        Watermark::At(min.min(state.next))
    }

    pub fn exhausted(&self, index: BatchIndex) -> bool {
        index >= self.limit
    }
}

/// Rows produced for `index`; some batches are empty.
pub fn rows_for(index: BatchIndex) -> Range<i64> {
    let len = (index * 37 % 50) as i64;
    let start = index as i64 * 1_000;
    start..start + len
}

/// Every value a full run over `0..limit` produces, in batch order.
pub fn expected_values(limit: BatchIndex) -> Vec<i64> {
    (0..limit).flat_map(rows_for).collect()
}

/// Claim batches until the scheduler runs dry, sinking each batch in a few
/// pieces with random pauses so batches complete out of order.
pub fn run_producer<F: CopyFunction>(
    sink: &BatchCopySink<F>,
    scheduler: &Scheduler,
) -> Result<()> {
    let Some(mut index) = scheduler.claim() else {
        return Ok(());
    };
    let mut local = sink.local_state(index);
    loop {
        let rows = rows_for(index);
        let mut start = rows.start;
        while start < rows.end {
            let end = (start + fastrand::i64(1..=20)).min(rows.end);
            sink.sink(&mut local, batch(start..end))?;
            start = end;
        }
        if fastrand::u8(..4) == 0 {
            std::thread::sleep(Duration::from_micros(fastrand::u64(0..300)));
        }
        let (next, watermark) = scheduler.advance(index);
        sink.next_batch(&mut local, next, watermark)?;
        scheduler.retire(index);
        index = next;
        if scheduler.exhausted(index) {
            break;
        }
    }
    sink.combine(local)?;
    scheduler.retire(index);
    Ok(())
}
