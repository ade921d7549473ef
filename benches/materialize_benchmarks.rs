//! Materialization benchmarks: batch copy, long → wide reshape, macro expansion.

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flightsql_frames::frame::long_to_wide;
use flightsql_frames::materialize::MemoryRecordReader;
use flightsql_frames::{frame_for_records, interpolate, MacroContext, MacroRegistry, TimeRange};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const BATCH_ROWS: usize = 8_192;
const HOSTS: [&str; 4] = ["a", "b", "c", "d"];

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("time", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("host", DataType::Utf8, false),
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, true),
    ]))
}

/// Long time series batches, four hosts per timestamp
fn batches(rows: usize) -> Vec<RecordBatch> {
    let schema = schema();
    (0..rows)
        .step_by(BATCH_ROWS)
        .map(|start| {
            let end = (start + BATCH_ROWS).min(rows);
            let idx = start..end;
            let time: ArrayRef = Arc::new(TimestampNanosecondArray::from_iter_values(
                idx.clone().map(|i| (i / HOSTS.len()) as i64 * 1_000_000_000),
            ));
            let host: ArrayRef = Arc::new(StringArray::from_iter_values(
                idx.clone().map(|i| HOSTS[i % HOSTS.len()]),
            ));
            let id: ArrayRef = Arc::new(Int64Array::from_iter_values(idx.clone().map(|i| i as i64)));
            let value: ArrayRef = Arc::new(Float64Array::from_iter(
                idx.map(|i| (i % 7 != 0).then_some(i as f64 * 0.5)),
            ));
            RecordBatch::try_new(schema.clone(), vec![time, host, id, value]).unwrap()
        })
        .collect()
}

fn bench_frame_for_records(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("frame_for_records");
    for rows in [1_000usize, 100_000] {
        let data = batches(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let mut reader = MemoryRecordReader::new(schema(), data.clone());
                rt.block_on(frame_for_records(&mut reader, usize::MAX))
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_long_to_wide(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("long_to_wide");
    for rows in [1_000usize, 100_000] {
        let mut reader = MemoryRecordReader::new(schema(), batches(rows));
        let frame = rt
            .block_on(frame_for_records(&mut reader, usize::MAX))
            .unwrap()
            .remove(0);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &frame, |b, frame| {
            b.iter(|| long_to_wide(frame).unwrap());
        });
    }
    group.finish();
}

fn bench_interpolate(c: &mut Criterion) {
    let registry = MacroRegistry::builtin();
    let ctx = MacroContext::new(
        TimeRange::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        ),
        Duration::from_secs(10),
    );
    let sql = "select $__dateBinAlias(time), host, avg(value) from cpu \
               where $__timeFilter(time) group by 1, 2 order by 1";

    c.bench_function("interpolate", |b| {
        b.iter(|| interpolate(sql, &ctx, &registry).unwrap());
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_frame_for_records, bench_long_to_wide, bench_interpolate
}
criterion_main!(benches);
