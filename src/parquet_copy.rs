//! Parquet output: one row group per prepared batch.
//!
//! Column encoding happens in `prepare_batch` on the producer threads; the
//! flush path only appends already encoded column chunks to the file, so the
//! serialized section stays short.

use std::{
    fmt,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::datatypes::SchemaRef;
use parquet::{
    arrow::{
        arrow_to_parquet_schema,
        arrow_writer::{compute_leaves, get_column_writers, ArrowColumnChunk},
    },
    basic::{Compression, ZstdLevel},
    file::{
        properties::{WriterProperties, WriterPropertiesPtr},
        writer::SerializedFileWriter,
    },
    schema::types::SchemaDescriptor,
};
use parking_lot::Mutex;

use crate::{
    collection::RowCollection,
    error::{CopyError, Result},
    function::CopyFunction,
    observability::log_debug,
};

/// Rows per row group unless configured otherwise.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 122_880;

/// Options of a [`ParquetCopy`].
#[derive(Debug, Clone)]
pub struct ParquetCopyOptions {
    pub(crate) row_group_size: usize,
    pub(crate) writer_properties: Option<WriterProperties>,
}

impl Default for ParquetCopyOptions {
    fn default() -> Self {
        ParquetCopyOptions {
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            writer_properties: None,
        }
    }
}

impl ParquetCopyOptions {
    /// Target rows per row group; drives the sink's repartitioning.
    pub fn row_group_size(self, row_group_size: usize) -> Self {
        ParquetCopyOptions {
            row_group_size,
            ..self
        }
    }

    /// Replace the default zstd writer properties.
    pub fn writer_properties(self, writer_properties: WriterProperties) -> Self {
        ParquetCopyOptions {
            writer_properties: Some(writer_properties),
            ..self
        }
    }

    fn properties(&self) -> WriterProperties {
        self.writer_properties.clone().unwrap_or_else(|| {
            WriterProperties::builder()
                .set_compression(Compression::ZSTD(ZstdLevel::default()))
                .build()
        })
    }
}

/// Encoded columns of one row group.
pub struct PreparedRowGroup {
    chunks: Vec<ArrowColumnChunk>,
    rows: usize,
}

impl PreparedRowGroup {
    /// Rows in the row group.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl fmt::Debug for PreparedRowGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRowGroup")
            .field("columns", &self.chunks.len())
            .field("rows", &self.rows)
            .finish()
    }
}

/// Copy function writing a single Parquet file.
pub struct ParquetCopy {
    path: PathBuf,
    schema: SchemaRef,
    parquet_schema: SchemaDescriptor,
    props: WriterPropertiesPtr,
    row_group_size: usize,
    writer: Mutex<Option<SerializedFileWriter<BufWriter<File>>>>,
}

impl ParquetCopy {
    /// Create `path` and write the Parquet header.
    pub fn try_new(path: &Path, schema: &SchemaRef, options: ParquetCopyOptions) -> Result<Self> {
        let parquet_schema = arrow_to_parquet_schema(schema)?;
        let props = Arc::new(options.properties());
        let file = File::create(path)?;
        let writer = SerializedFileWriter::new(
            BufWriter::new(file),
            parquet_schema.root_schema_ptr(),
            Arc::clone(&props),
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            schema: schema.clone(),
            parquet_schema,
            props,
            row_group_size: options.row_group_size,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ParquetCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParquetCopy")
            .field("path", &self.path)
            .field("schema_fields", &self.schema.fields().len())
            .field("row_group_size", &self.row_group_size)
            .finish()
    }
}

impl CopyFunction for ParquetCopy {
    type Prepared = PreparedRowGroup;

    fn desired_batch_size(&self) -> Option<usize> {
        Some(self.row_group_size)
    }

    fn prepare_batch(&self, collection: RowCollection) -> Result<PreparedRowGroup> {
        if collection.schema().fields() != self.schema.fields() {
            return Err(CopyError::SchemaMismatch(format!(
                "parquet writer for {} expects {:?}",
                self.path.display(),
                self.schema.fields()
            )));
        }
        let rows = collection.len();
        let mut writers = get_column_writers(&self.parquet_schema, &self.props, &self.schema)?;
        for chunk in collection.chunks() {
            let mut writer_iter = writers.iter_mut();
            for (field, column) in self.schema.fields().iter().zip(chunk.columns()) {
                for leaf in compute_leaves(field.as_ref(), column)? {
                    let writer = writer_iter.next().ok_or_else(|| {
                        CopyError::SchemaMismatch("more leaf columns than writers".to_string())
                    })?;
                    writer.write(&leaf)?;
                }
            }
        }
        let chunks = writers
            .into_iter()
            .map(|writer| writer.close())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(PreparedRowGroup { chunks, rows })
    }

    fn flush_batch(&self, prepared: PreparedRowGroup) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| CopyError::writer("parquet writer already closed"))?;
        let mut row_group = writer.next_row_group()?;
        for chunk in prepared.chunks {
            chunk.append_to_row_group(&mut row_group)?;
        }
        row_group.close()?;
        log_debug!(
            component = "parquet",
            event = "row_group_written",
            rows = prepared.rows,
        );
        Ok(())
    }

    fn finalize(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| CopyError::writer("parquet writer already closed"))?;
        let metadata = writer.close()?;
        log_debug!(
            component = "parquet",
            event = "parquet_closed",
            path = %self.path.display(),
            rows = metadata.num_rows,
            row_groups = metadata.row_groups.len(),
        );
        Ok(())
    }
}
