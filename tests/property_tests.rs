//! Property-based tests (proptest) for the row cap and macro expansion.

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use flightsql_frames::materialize::MemoryRecordReader;
use flightsql_frames::{frame_for_records, interpolate, MacroContext, MacroRegistry, TimeRange};
use proptest::prelude::*;

fn reader(batch_sizes: &[usize]) -> MemoryRecordReader {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    let mut next = 0i64;
    let batches = batch_sizes
        .iter()
        .map(|&n| {
            let col: ArrayRef = Arc::new(Int64Array::from_iter_values(next..next + n as i64));
            next += n as i64;
            RecordBatch::try_new(schema.clone(), vec![col]).unwrap()
        })
        .collect();
    MemoryRecordReader::new(schema, batches)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn ctx(from: i64, span: i64, interval_ms: u64) -> MacroContext {
    let from_t = Utc.timestamp_opt(from, 0).unwrap();
    let to_t = Utc.timestamp_opt(from + span, 0).unwrap();
    MacroContext::new(
        TimeRange::new(from_t, to_t),
        Duration::from_millis(interval_ms),
    )
}

proptest! {
    #[test]
    fn prop_row_cap_bounds_frame(
        sizes in prop::collection::vec(0usize..50, 0..8),
        cap in 1usize..100,
    ) {
        let total: usize = sizes.iter().sum();
        let frames = runtime()
            .block_on(frame_for_records(&mut reader(&sizes), cap))
            .unwrap();

        if total == 0 {
            prop_assert!(frames.is_empty());
        } else {
            prop_assert_eq!(frames.len(), 1);
            let frame = &frames[0];
            prop_assert_eq!(frame.rows(), total.min(cap));
            prop_assert!(frame.is_rectangular());
            let expected_notices = usize::from(total > cap);
            prop_assert_eq!(frame.meta.notices.len(), expected_notices);
        }
    }

    #[test]
    fn prop_rows_keep_stream_order(sizes in prop::collection::vec(1usize..20, 1..5)) {
        let frames = runtime()
            .block_on(frame_for_records(&mut reader(&sizes), usize::MAX))
            .unwrap();
        let field = &frames[0].fields[0];
        for i in 0..field.len() {
            prop_assert_eq!(
                field.at(i),
                Some(flightsql_frames::frame::Scalar::Int64(i as i64))
            );
        }
    }

    #[test]
    fn prop_interpolate_is_deterministic(
        from in 0i64..2_000_000_000,
        span in 1i64..1_000_000,
        interval_ms in 1u64..86_400_000,
        column in "[a-z_]{1,12}",
    ) {
        let registry = MacroRegistry::builtin();
        let ctx = ctx(from, span, interval_ms);
        let sql = format!(
            "select $__dateBin({column}) from t where $__timeFilter({column}) group by $__interval"
        );
        let first = interpolate(&sql, &ctx, &registry).unwrap();
        let second = interpolate(&sql, &ctx, &registry).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(!first.contains("$__"));
    }

    #[test]
    fn prop_sql_without_macros_is_unchanged(sql in "[a-zA-Z0-9 ,.*=<>'()]{0,80}") {
        let registry = MacroRegistry::builtin();
        let out = interpolate(&sql, &ctx(0, 60, 1000), &registry).unwrap();
        prop_assert_eq!(out, sql);
    }
}
