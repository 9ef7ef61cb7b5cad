//! Producer-private row buffer.

use arrow::{array::RecordBatch, datatypes::SchemaRef};

use crate::{
    batch::BatchIndex,
    collection::RowCollection,
    error::Result,
};

/// Per-producer accumulator owning the rows of the batch currently being
/// produced.
///
/// Appends never touch shared state. The sink takes the collection out at
/// every batch boundary (see [`BatchCopySink::next_batch`]) and once more when
/// the accumulator is combined into the global state.
///
/// [`BatchCopySink::next_batch`]: crate::BatchCopySink::next_batch
#[derive(Debug)]
pub struct LocalAccumulator {
    schema: SchemaRef,
    chunk_width: usize,
    batch_index: BatchIndex,
    collection: Option<RowCollection>,
    rows_copied: u64,
}

impl LocalAccumulator {
    pub(crate) fn new(schema: SchemaRef, chunk_width: usize, batch_index: BatchIndex) -> Self {
        Self {
            schema,
            chunk_width,
            batch_index,
            collection: None,
            rows_copied: 0,
        }
    }

    /// Batch the accumulated rows belong to.
    pub fn batch_index(&self) -> BatchIndex {
        self.batch_index
    }

    /// Rows appended through this accumulator since it was created.
    pub fn rows_copied(&self) -> u64 {
        self.rows_copied
    }

    /// Rows buffered for the active batch.
    pub fn buffered_rows(&self) -> usize {
        self.collection.as_ref().map_or(0, RowCollection::len)
    }

    pub(crate) fn append(&mut self, batch: RecordBatch) -> Result<()> {
        let rows = batch.num_rows();
        let collection = self
            .collection
            .get_or_insert_with(|| RowCollection::new(self.schema.clone(), self.chunk_width));
        collection.append(batch)?;
        self.rows_copied += rows as u64;
        Ok(())
    }

    /// Close the active batch and start `next_index`.
    ///
    /// Returns the finished batch unless it holds no rows; empty batches are
    /// never handed to the registry.
    pub(crate) fn advance(&mut self, next_index: BatchIndex) -> Option<(BatchIndex, RowCollection)> {
        let finished = self.take_finished();
        self.batch_index = next_index;
        self.collection = Some(RowCollection::new(self.schema.clone(), self.chunk_width));
        finished
    }

    /// Take the rows of the active batch without starting a new one.
    pub(crate) fn take_finished(&mut self) -> Option<(BatchIndex, RowCollection)> {
        self.collection
            .take()
            .filter(|collection| !collection.is_empty())
            .map(|collection| (self.batch_index, collection))
    }
}
