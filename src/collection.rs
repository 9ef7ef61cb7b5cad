//! Append-only, chunked container for Arrow rows.

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::SchemaRef,
};

use crate::error::{CopyError, Result};

/// Default number of rows per chunk, also the tolerance used when deciding
/// whether a collection is "close enough" to a target batch size.
pub const DEFAULT_CHUNK_WIDTH: usize = 2048;

/// Ordered rows of a single schema held as a sequence of `RecordBatch` chunks.
///
/// Every chunk holds at most `chunk_width` rows and only the last chunk may be
/// partially filled. Appending tops up the last chunk before starting a new
/// one, so iterating [`RowCollection::chunks`] yields rows in append order.
#[derive(Debug, Clone)]
pub struct RowCollection {
    schema: SchemaRef,
    chunk_width: usize,
    chunks: Vec<RecordBatch>,
    len: usize,
}

impl RowCollection {
    /// Create an empty collection. A zero `chunk_width` is raised to one row.
    pub fn new(schema: SchemaRef, chunk_width: usize) -> Self {
        Self {
            schema,
            chunk_width: chunk_width.max(1),
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Create an empty collection sharing this collection's schema and width.
    pub fn empty_like(&self) -> Self {
        Self::new(self.schema.clone(), self.chunk_width)
    }

    /// Schema shared by every chunk.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Maximum rows per chunk.
    pub fn chunk_width(&self) -> usize {
        self.chunk_width
    }

    /// Total number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the collection holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently held.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Append the rows of `batch`.
    ///
    /// # Errors
    /// Returns [`CopyError::SchemaMismatch`] when the batch fields differ from
    /// the collection schema, or an Arrow error if topping up the last chunk
    /// fails.
    pub fn append(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema().fields() != self.schema.fields() {
            return Err(CopyError::SchemaMismatch(format!(
                "expected fields {:?}, got {:?}",
                self.schema.fields(),
                batch.schema().fields()
            )));
        }
        let rows = batch.num_rows();
        if rows == 0 {
            return Ok(());
        }

        let mut offset = 0;
        if let Some(last) = self.chunks.last_mut() {
            let room = self.chunk_width - last.num_rows();
            if room > 0 {
                let take = room.min(rows);
                *last = concat_batches(&self.schema, [&*last, &batch.slice(0, take)])?;
                offset = take;
            }
        }
        while offset < rows {
            let take = self.chunk_width.min(rows - offset);
            self.chunks.push(batch.slice(offset, take));
            offset += take;
        }
        self.len += rows;
        Ok(())
    }

    /// Iterate chunks in row order.
    pub fn chunks(&self) -> impl ExactSizeIterator<Item = &RecordBatch> + '_ {
        self.chunks.iter()
    }

    /// Consume the collection, yielding its chunks in row order.
    pub fn into_chunks(self) -> Vec<RecordBatch> {
        self.chunks
    }

    /// Materialize every row into a single batch.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.chunks)?)
    }

    /// Whether `self.len()` is within one chunk width of `target`.
    pub fn is_sized_for(&self, target: usize) -> bool {
        self.len.abs_diff(target) < self.chunk_width
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Array, Int64Array},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
    }

    fn batch(values: impl IntoIterator<Item = i64>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![Arc::new(Int64Array::from_iter_values(values))],
        )
        .expect("record batch")
    }

    fn values(collection: &RowCollection) -> Vec<i64> {
        collection
            .chunks()
            .flat_map(|chunk| {
                let col = chunk
                    .column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .expect("int64 column");
                col.values().to_vec()
            })
            .collect()
    }

    #[test]
    fn append_splits_and_tops_up_chunks() {
        let mut collection = RowCollection::new(schema(), 4);
        collection.append(batch(0..3)).expect("append");
        collection.append(batch(3..10)).expect("append");

        assert_eq!(collection.len(), 10);
        let widths: Vec<_> = collection.chunks().map(|c| c.num_rows()).collect();
        assert_eq!(widths, vec![4, 4, 2]);
        assert_eq!(values(&collection), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn empty_batches_are_ignored() {
        let mut collection = RowCollection::new(schema(), 4);
        collection.append(batch(std::iter::empty())).expect("append");
        assert!(collection.is_empty());
        assert_eq!(collection.num_chunks(), 0);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let other = Arc::new(Schema::new(vec![Field::new("w", DataType::Int64, false)]));
        let foreign = RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1]))])
            .expect("record batch");
        let mut collection = RowCollection::new(schema(), 4);
        assert!(matches!(
            collection.append(foreign),
            Err(CopyError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn concat_preserves_order() {
        let mut collection = RowCollection::new(schema(), 3);
        collection.append(batch(0..5)).expect("append");
        collection.append(batch(5..8)).expect("append");
        let all = collection.concat().expect("concat");
        let col = all
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64 column");
        assert_eq!(col.len(), 8);
        assert_eq!(col.values().to_vec(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn zero_chunk_width_holds_one_row_per_chunk() {
        let mut collection = RowCollection::new(schema(), 0);
        assert_eq!(collection.chunk_width(), 1);
        collection.append(batch(0..3)).expect("append");
        assert_eq!(collection.num_chunks(), 3);
        assert_eq!(values(&collection), vec![0, 1, 2]);
    }

    #[test]
    fn sized_for_uses_chunk_width_tolerance() {
        let mut collection = RowCollection::new(schema(), 4);
        collection.append(batch(0..8)).expect("append");
        assert!(collection.is_sized_for(10));
        assert!(collection.is_sized_for(5));
        assert!(!collection.is_sized_for(12));
        assert!(!collection.is_sized_for(4));
    }
}
