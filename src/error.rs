use std::{error::Error as StdError, io};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::batch::BatchKey;

/// Result alias used across the crate.
pub type Result<T, E = CopyError> = std::result::Result<T, E>;

/// Which registry map rejected a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStage {
    /// Batches waiting to be repartitioned.
    Raw,
    /// Batches prepared (or being prepared) for the writer.
    Prepared,
}

impl std::fmt::Display for BatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStage::Raw => f.write_str("raw"),
            BatchStage::Prepared => f.write_str("prepared"),
        }
    }
}

/// Error returned by the batch copy sink.
///
/// Every variant is fatal for the sink that produced it: once returned from a
/// sink operation the sink is poisoned and refuses further work.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The scheduler submitted the same batch twice.
    #[error("duplicate batch index {key} encountered in {stage} batches")]
    DuplicateBatchIndex {
        /// Offending key.
        key: BatchKey,
        /// Map that already held the key.
        stage: BatchStage,
    },
    /// A sink operation was attempted after `finalize` completed.
    #[error("batch copy sink already finalized")]
    Finalized,
    /// A previous operation failed and the output is in an undefined state.
    #[error("batch copy sink poisoned by an earlier failure")]
    Poisoned,
    /// `finalize` ran while producer accumulators were still live.
    #[error("{0} local states were not combined before finalize")]
    UncombinedLocals(usize),
    /// Batches were still buffered after the final flush.
    #[error("{raw} raw and {prepared} prepared batches left unflushed after finalize")]
    Unflushed {
        /// Raw batches left behind.
        raw: usize,
        /// Prepared or pending batches left behind.
        prepared: usize,
    },
    /// Sink configuration rejected at construction.
    #[error("invalid copy option: {0}")]
    InvalidOption(String),
    /// Rows handed to a writer do not match the writer's schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Arrow compute or construction failure.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// Parquet encoding or write failure.
    #[error("parquet write error: {0}")]
    Parquet(#[from] ParquetError),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Failure raised by a user supplied writer.
    #[error("writer error: {0}")]
    Writer(#[source] Box<dyn StdError + Send + Sync>),
}

impl CopyError {
    /// Wrap an arbitrary writer failure.
    pub fn writer<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        CopyError::Writer(err.into())
    }
}
