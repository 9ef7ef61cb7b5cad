//! Batch identity: scheduler indexes, registry keys and the flush watermark.

use std::fmt;

/// Scheduler assigned index of a unit of parallel work. Output order follows
/// increasing batch index.
pub type BatchIndex = u64;

/// Key of an entry in the prepared map.
///
/// Batches prepared as-is use `part == 0`. Repartitioned output is keyed by the
/// last raw batch that contributed rows plus a sink-wide sequence number, so
/// several output batches cut from the same input keep their emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchKey {
    index: BatchIndex,
    part: u64,
}

impl BatchKey {
    /// Key for a batch that is prepared exactly as it was produced.
    pub const fn whole(index: BatchIndex) -> Self {
        Self { index, part: 0 }
    }

    /// Key for one piece of repartitioned output.
    pub const fn part(index: BatchIndex, part: u64) -> Self {
        Self { index, part }
    }

    /// Whether the key names a batch prepared exactly as produced.
    pub const fn is_whole(&self) -> bool {
        self.part == 0
    }

    /// Scheduler batch index the key is ordered by.
    pub const fn index(&self) -> BatchIndex {
        self.index
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.part == 0 {
            write!(f, "{}", self.index)
        } else {
            write!(f, "{}.{}", self.index, self.part)
        }
    }
}

/// Smallest batch index any producer may still emit.
///
/// Batches strictly below the watermark can no longer be overtaken by an
/// earlier batch, so they are safe to repartition and flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Watermark {
    /// Producers are still working on batches `>= min_in_flight`.
    At(BatchIndex),
    /// No producer remains; every batch is admitted.
    Unbounded,
}

impl Watermark {
    /// Whether a batch with `index` lies below the watermark.
    #[inline]
    pub fn admits(&self, index: BatchIndex) -> bool {
        match self {
            Watermark::At(min_in_flight) => index < *min_in_flight,
            Watermark::Unbounded => true,
        }
    }
}

impl From<BatchIndex> for Watermark {
    fn from(min_in_flight: BatchIndex) -> Self {
        Watermark::At(min_in_flight)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::At(index) => write!(f, "{index}"),
            Watermark::Unbounded => f.write_str("unbounded"),
        }
    }
}
