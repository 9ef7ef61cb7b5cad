//! Contract between the sink and an output format.

use crate::{collection::RowCollection, error::Result};

/// An output format the sink writes through.
///
/// `prepare_batch` runs on producer threads, possibly many at once, and must
/// not depend on the order in which it is called. `flush_batch` is invoked
/// strictly in batch order and never concurrently with itself; it is the only
/// place that may touch the physical output.
pub trait CopyFunction: Send + Sync {
    /// Writer specific form of a batch that is ready to be written.
    type Prepared: Send;

    /// Preferred number of rows per prepared batch. `None` or `Some(0)`
    /// disables repartitioning: every produced batch is prepared as-is.
    fn desired_batch_size(&self) -> Option<usize> {
        None
    }

    /// Convert sized rows into writer form.
    fn prepare_batch(&self, collection: RowCollection) -> Result<Self::Prepared>;

    /// Append a prepared batch to the output.
    fn flush_batch(&self, prepared: Self::Prepared) -> Result<()>;

    /// Called once after every batch has been flushed, e.g. to write a footer.
    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}
