use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use arrow::{
    array::{Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use batchcopy::{
    BatchCopySink, BatchIndex, CopyOption, ParquetCopy, ParquetCopyOptions, Watermark,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mimalloc::MiMalloc;
use parking_lot::Mutex;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const BATCHES: u64 = 256;
const ROWS_PER_BATCH: i64 = 2_048;

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("payload", DataType::Utf8, false),
    ]))
}

fn record_batch(schema: &SchemaRef, index: BatchIndex) -> RecordBatch {
    let start = index as i64 * ROWS_PER_BATCH;
    let ids = Int64Array::from_iter_values(start..start + ROWS_PER_BATCH);
    let payload: StringArray = (0..ROWS_PER_BATCH)
        .map(|_| {
            let value: String = std::iter::repeat_with(fastrand::alphanumeric).take(32).collect();
            Some(value)
        })
        .collect();
    RecordBatch::try_new(schema.clone(), vec![Arc::new(ids), Arc::new(payload)]).unwrap()
}

#[inline(never)]
fn parallel_copy(threads: usize, row_group_size: usize) {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let sink = BatchCopySink::open(
        CopyOption::from(dir.path().join("bench.parquet")),
        schema.clone(),
        |path, schema| {
            ParquetCopy::try_new(
                path,
                schema,
                ParquetCopyOptions::default().row_group_size(row_group_size),
            )
        },
    )
    .unwrap();

    let next = AtomicU64::new(0);
    let in_flight = Mutex::new(BTreeSet::new());
    let claim = || {
        let mut in_flight = in_flight.lock();
        let index = next.fetch_add(1, Ordering::AcqRel);
        in_flight.insert(index);
        index
    };

    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut index = claim();
                let mut local = sink.local_state(index);
                while index < BATCHES {
                    sink.sink(&mut local, record_batch(&schema, index)).unwrap();
                    let next_index = claim();
                    let watermark = in_flight.lock().first().copied().unwrap_or(next_index);
                    sink.next_batch(&mut local, next_index, Watermark::At(watermark))
                        .unwrap();
                    in_flight.lock().remove(&index);
                    index = next_index;
                }
                sink.combine(local).unwrap();
                in_flight.lock().remove(&index);
            });
        }
    });
    sink.finalize().unwrap();
}

fn copy_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("parquet_copy");
    group.sample_size(10);
    group.throughput(Throughput::Elements(BATCHES * ROWS_PER_BATCH as u64));

    for threads in [1, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &threads,
            |b, threads| b.iter(|| parallel_copy(*threads, 122_880)),
        );
    }
    for row_group_size in [8_192, 131_072] {
        group.bench_with_input(
            BenchmarkId::new("row_group_size", row_group_size),
            &row_group_size,
            |b, row_group_size| b.iter(|| parallel_copy(8, *row_group_size)),
        );
    }
    group.finish();
}

criterion_group!(benches, copy_throughput);
criterion_main!(benches);
