//! The batch copy operator.
//!
//! Producers each own a [`LocalAccumulator`] and call [`BatchCopySink::sink`]
//! for every incoming record batch. At a batch boundary the scheduler calls
//! [`BatchCopySink::next_batch`] with the next batch index and the current
//! watermark; the finished rows are either prepared right away or parked for
//! repartitioning, and whatever became flushable is written in batch order.
//! [`BatchCopySink::combine`] retires an accumulator and
//! [`BatchCopySink::finalize`] writes everything that is left.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Instant,
};

use arrow::{array::RecordBatch, datatypes::SchemaRef};

use crate::{
    batch::{BatchIndex, BatchKey, Watermark},
    collection::RowCollection,
    error::{CopyError, Result},
    flush::{FlushMode, FlushReport, FlushSequencer},
    fs,
    function::CopyFunction,
    local::LocalAccumulator,
    metrics::{CopyMetrics, CopyMetricsSnapshot},
    observability::{log_debug, log_error, log_info, log_warn},
    option::CopyOption,
    registry::{BatchRegistry, PreparedSlot},
    repartition::RepartitionOutcome,
};

/// Global state of one copy operation.
pub struct BatchCopySink<F: CopyFunction> {
    function: F,
    schema: SchemaRef,
    option: CopyOption,
    batch_size: usize,
    registry: BatchRegistry<F::Prepared>,
    flusher: FlushSequencer,
    metrics: CopyMetrics,
    open_locals: AtomicUsize,
    finalized: AtomicBool,
    poisoned: AtomicBool,
}

impl<F: CopyFunction> BatchCopySink<F> {
    /// Build a sink around an already opened copy function.
    ///
    /// # Errors
    /// [`CopyError::InvalidOption`] for a zero chunk width.
    pub fn new(function: F, schema: SchemaRef, option: CopyOption) -> Result<Self> {
        if option.chunk_width == 0 {
            return Err(CopyError::InvalidOption(
                "chunk width must be non-zero".to_string(),
            ));
        }
        let batch_size = option
            .target_batch_size
            .or_else(|| function.desired_batch_size())
            .unwrap_or(0);
        log_info!(
            component = "sink",
            event = "sink_created",
            batch_size,
            chunk_width = option.chunk_width,
            use_tmp_file = option.use_tmp_file,
        );
        Ok(Self {
            function,
            schema,
            option,
            batch_size,
            registry: BatchRegistry::new(),
            flusher: FlushSequencer::new(),
            metrics: CopyMetrics::default(),
            open_locals: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Open the copy function on the option's write path and build a sink.
    ///
    /// `init` receives the temporary path when `use_tmp_file` is set.
    ///
    /// # Errors
    /// [`CopyError::InvalidOption`] when the option carries no path, or any
    /// error returned by `init`.
    pub fn open<I>(option: CopyOption, schema: SchemaRef, init: I) -> Result<Self>
    where
        I: FnOnce(&Path, &SchemaRef) -> Result<F>,
    {
        let write_path = option
            .write_path()
            .ok_or_else(|| CopyError::InvalidOption("copy option has no path".to_string()))?;
        let function = init(&write_path, &schema)?;
        Self::new(function, schema, option)
    }

    /// The copy function the sink writes through.
    pub fn function(&self) -> &F {
        &self.function
    }

    /// Schema every sunk batch must match.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Effective target rows per prepared batch; `0` when repartitioning is
    /// disabled.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows combined into the global total so far.
    pub fn rows_copied(&self) -> u64 {
        self.registry.total_rows()
    }

    /// Point-in-time counters.
    pub fn metrics(&self) -> CopyMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Raw and prepared entries still held by the registry.
    pub fn pending_batches(&self) -> (usize, usize) {
        self.registry.pending_counts()
    }

    /// Create the accumulator of a producer starting at `batch_index`.
    pub fn local_state(&self, batch_index: BatchIndex) -> LocalAccumulator {
        self.open_locals.fetch_add(1, Ordering::AcqRel);
        LocalAccumulator::new(self.schema.clone(), self.option.chunk_width, batch_index)
    }

    /// Append rows to the producer's active batch.
    pub fn sink(&self, local: &mut LocalAccumulator, batch: RecordBatch) -> Result<()> {
        self.ensure_open()?;
        self.poison_on_err(|| local.append(batch))
    }

    /// Close the producer's active batch, start `next_index`, and write every
    /// batch that `watermark` makes safe.
    pub fn next_batch(
        &self,
        local: &mut LocalAccumulator,
        next_index: BatchIndex,
        watermark: impl Into<Watermark>,
    ) -> Result<()> {
        self.ensure_open()?;
        let watermark = watermark.into();
        let finished = local.advance(next_index);
        self.poison_on_err(|| {
            if let Some((index, collection)) = finished {
                self.hand_off(index, collection, Some(watermark))?;
            }
            self.flush_with(watermark, FlushMode::Opportunistic)?;
            Ok(())
        })
    }

    /// Retire a producer: hand off its last batch and add its row count to the
    /// global total.
    pub fn combine(&self, mut local: LocalAccumulator) -> Result<()> {
        self.ensure_open()?;
        let finished = local.take_finished();
        self.poison_on_err(|| {
            if let Some((index, collection)) = finished {
                self.hand_off(index, collection, None)?;
            }
            Ok(())
        })?;
        self.registry.add_rows(local.rows_copied());
        self.open_locals.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Write every batch that `watermark` makes safe.
    ///
    /// Returns early when another thread is already flushing.
    pub fn flush(&self, watermark: impl Into<Watermark>) -> Result<FlushReport> {
        self.ensure_open()?;
        let watermark = watermark.into();
        self.poison_on_err(|| self.flush_with(watermark, FlushMode::Opportunistic))
    }

    /// Repartition and write everything that is left, run the copy function's
    /// finalize hook and promote the temporary file. Returns the total number
    /// of rows copied.
    ///
    /// [`CopyError::UncombinedLocals`] leaves the sink open: the caller can
    /// combine the remaining accumulators and call `finalize` again.
    ///
    /// # Errors
    /// [`CopyError::Finalized`] on a second call; [`CopyError::UncombinedLocals`]
    /// when accumulators were never combined; [`CopyError::Unflushed`] if
    /// batches remain after the final flush; any writer error.
    pub fn finalize(&self) -> Result<u64> {
        self.ensure_open()?;
        let open = self.open_locals.load(Ordering::Acquire);
        if open > 0 {
            log_warn!(
                component = "sink",
                event = "finalize_with_open_locals",
                open_locals = open,
            );
            return Err(CopyError::UncombinedLocals(open));
        }
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(CopyError::Finalized);
        }

        self.poison_on_err(|| {
            if self.batch_size > 0 {
                self.repartition(Watermark::Unbounded, true)?;
            }
            self.flush_with(Watermark::Unbounded, FlushMode::Blocking)?;
            let (raw, prepared) = self.registry.pending_counts();
            if raw > 0 || prepared > 0 {
                return Err(CopyError::Unflushed { raw, prepared });
            }
            self.function.finalize()?;
            if self.option.use_tmp_file {
                if let Some(path) = self.option.final_path() {
                    fs::promote_tmp_file(path)?;
                    log_info!(
                        component = "sink",
                        event = "tmp_file_promoted",
                        path = %path.display(),
                    );
                }
            }
            Ok(())
        })?;

        let rows = self.rows_copied();
        log_info!(component = "sink", event = "sink_finalized", rows);
        Ok(rows)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finalized.load(Ordering::Relaxed) {
            return Err(CopyError::Finalized);
        }
        if self.poisoned.load(Ordering::Relaxed) {
            return Err(CopyError::Poisoned);
        }
        Ok(())
    }

    fn poison_on_err<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        op().inspect_err(|err| {
            if !self.poisoned.swap(true, Ordering::AcqRel) {
                log_error!(
                    component = "sink",
                    event = "sink_poisoned",
                    error = %err,
                );
            }
        })
    }

    /// Route a finished batch. `watermark` is `None` when the caller cannot
    /// vouch for any ordering, in which case raw batches are only parked.
    fn hand_off(
        &self,
        index: BatchIndex,
        collection: RowCollection,
        watermark: Option<Watermark>,
    ) -> Result<()> {
        if self.batch_size == 0 {
            return self.prepare_whole(index, collection);
        }
        let rows = collection.len();
        self.registry.submit_raw(index, collection)?;
        self.metrics.record_raw_submitted();
        log_debug!(
            component = "registry",
            event = "raw_batch_submitted",
            batch_index = index,
            rows,
        );
        if let Some(watermark) = watermark {
            self.repartition(watermark, false)?;
        }
        Ok(())
    }

    fn prepare_whole(&self, index: BatchIndex, collection: RowCollection) -> Result<()> {
        let key = BatchKey::whole(index);
        self.registry.submit_prepared(key, PreparedSlot::Pending)?;
        self.prepare(key, collection)
    }

    fn prepare(&self, key: BatchKey, collection: RowCollection) -> Result<()> {
        let rows = collection.len();
        let prepared = self.function.prepare_batch(collection)?;
        self.registry.complete_prepared(key, prepared);
        self.metrics.record_prepared(rows);
        log_debug!(
            component = "sink",
            event = "batch_prepared",
            key = %key,
            rows,
        );
        Ok(())
    }

    fn repartition(&self, watermark: Watermark, final_pass: bool) -> Result<()> {
        let (outcome, keys) = self
            .registry
            .repartition(watermark, self.batch_size, final_pass)?;
        match outcome {
            RepartitionOutcome::Idle => Ok(()),
            RepartitionOutcome::Deferred { candidate_rows } => {
                self.metrics.record_repartition_deferral();
                log_debug!(
                    component = "repartition",
                    event = "repartition_deferred",
                    candidate_rows,
                    target = self.batch_size,
                    watermark = %watermark,
                );
                Ok(())
            }
            RepartitionOutcome::Emitted {
                last_index,
                batches,
                carried_rows,
            } => {
                self.metrics.record_repartition_pass();
                log_debug!(
                    component = "repartition",
                    event = "repartition_pass",
                    last_index,
                    batches = batches.len(),
                    carried_rows,
                    final_pass,
                );
                for (key, collection) in keys.into_iter().zip(batches) {
                    self.prepare(key, collection)?;
                }
                Ok(())
            }
        }
    }

    fn flush_with(&self, watermark: Watermark, mode: FlushMode) -> Result<FlushReport> {
        let report = self
            .flusher
            .flush(&self.registry, watermark, mode, |_, prepared| {
                let started = Instant::now();
                self.function.flush_batch(prepared)?;
                self.metrics.record_flush(started.elapsed());
                Ok(())
            })?;
        if report.skipped {
            self.metrics.record_flush_skip();
            log_debug!(
                component = "flush",
                event = "flush_skipped",
                watermark = %watermark,
            );
        }
        Ok(report)
    }
}
