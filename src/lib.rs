#![deny(missing_docs)]
//! Order-preserving parallel batch copy.
//!
//! Many producer threads push Arrow `RecordBatch` values into a
//! [`BatchCopySink`]. Rows are grouped by a scheduler-assigned batch index;
//! batches are optionally regrouped towards the output's preferred size,
//! prepared in parallel and written through a [`CopyFunction`] strictly in
//! batch index order, one writer at a time.
//!
//! ```ignore
//! let sink = BatchCopySink::open(
//!     CopyOption::from("out.parquet").use_tmp_file(true),
//!     schema,
//!     |path, schema| ParquetCopy::try_new(path, schema, ParquetCopyOptions::default()),
//! )?;
//! let mut local = sink.local_state(0);
//! sink.sink(&mut local, batch)?;
//! sink.next_batch(&mut local, 1, Watermark::At(1))?;
//! sink.combine(local)?;
//! let rows = sink.finalize()?;
//! ```

/// Batch indexes, prepared batch keys and the flush watermark.
pub mod batch;
/// Chunked row storage.
pub mod collection;
/// Error types.
pub mod error;
/// Ordered, mutually exclusive flushing.
pub mod flush;
/// Temporary output files.
pub mod fs;
/// The output format contract.
pub mod function;
/// Per-producer accumulation.
pub mod local;
/// Sink counters.
pub mod metrics;
mod observability;
/// Sink configuration.
pub mod option;
/// Parquet output.
pub mod parquet_copy;
/// Shared raw and prepared batch maps.
pub mod registry;
/// Regrouping of raw batches.
pub mod repartition;
/// The copy operator.
pub mod sink;

pub use crate::{
    batch::{BatchIndex, BatchKey, Watermark},
    collection::{RowCollection, DEFAULT_CHUNK_WIDTH},
    error::{BatchStage, CopyError, Result},
    flush::{FlushMode, FlushReport},
    function::CopyFunction,
    local::LocalAccumulator,
    metrics::{CopyMetricsSnapshot, FlushMetricsSnapshot},
    option::CopyOption,
    parquet_copy::{ParquetCopy, ParquetCopyOptions},
    sink::BatchCopySink,
};
