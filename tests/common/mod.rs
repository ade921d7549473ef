//! Shared in-memory Flight SQL engine for integration tests.
//!
//! Tickets carry the SQL text. The SQL decides what the engine does:
//!
//! | SQL contains | Behaviour |
//! |--------------|-----------|
//! | `panic` | `do_get` panics |
//! | `fail` | `execute` returns an internal status |
//! | `two_endpoints` / `no_endpoints` | wrong ticket count |
//! | `empty` | stream with a schema and no rows |
//! | `long` | long time series (time, host, value) |
//! | `rows:N` | N rows of `v` |
//! | `flight` | same rows, encoded to `FlightData` and read back through `FlightRecordReader` |
//! | anything else | one row `{v: 1}` |

#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Float64Array, Int64Array, StringArray};
use arrow::array::TimestampNanosecondArray;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::ipc::writer::IpcWriteOptions;
use arrow::record_batch::RecordBatch;
use arrow_flight::sql::CommandGetTables;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::{FlightData, IpcMessage, SchemaAsIpc, Ticket};
use flightsql_frames::engine::{EngineError, QueryEngine};
use flightsql_frames::materialize::{MemoryRecordReader, RecordReader};
use flightsql_frames::stream::{FlightRecordReader, HeaderCapturingStream, RawStream};
use futures_util::{stream, TryStreamExt};
use std::collections::VecDeque;
use flightsql_frames::{DataQuery, DataSource, Metadata, TimeRange};
use serde_json::json;

pub const TABLES_TICKET: &str = "__tables__";
pub const SQL_INFO_TICKET: &str = "__sql_info__";
pub const KNOWN_TABLE: &str = "cpu";

#[derive(Debug, Default)]
pub struct MockEngine;

fn ticket_sql(ticket: &Ticket) -> String {
    String::from_utf8_lossy(&ticket.ticket).into_owned()
}

fn value_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
}

fn value_reader(rows: i64) -> MemoryRecordReader {
    let schema = value_schema();
    let col: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows));
    let batch = RecordBatch::try_new(schema.clone(), vec![col]).unwrap();
    MemoryRecordReader::new(schema, vec![batch])
}

pub fn cpu_schema() -> Schema {
    Schema::new(vec![
        Field::new("time", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("host", DataType::Utf8, false),
        Field::new("value", DataType::Float64, true),
    ])
}

fn long_reader() -> MemoryRecordReader {
    let schema = Arc::new(cpu_schema());
    let sec = 1_000_000_000i64;
    let time: ArrayRef = Arc::new(TimestampNanosecondArray::from(vec![sec, sec, 2 * sec]));
    let host: ArrayRef = Arc::new(StringArray::from(vec!["b", "a", "a"]));
    let value: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0]));
    let batch = RecordBatch::try_new(schema.clone(), vec![time, host, value]).unwrap();
    MemoryRecordReader::new(schema, vec![batch])
}

fn tables_reader(filter: Option<&str>) -> MemoryRecordReader {
    let schema = Arc::new(Schema::new(vec![
        Field::new("table_name", DataType::Utf8, false),
        Field::new("table_type", DataType::Utf8, false),
        Field::new("table_schema", DataType::Binary, false),
    ]));
    let ipc: IpcMessage = SchemaAsIpc::new(&cpu_schema(), &IpcWriteOptions::default())
        .try_into()
        .unwrap();

    let names: Vec<&str> = [KNOWN_TABLE]
        .into_iter()
        .filter(|name| filter.map_or(true, |f| f == *name))
        .collect();
    let n = names.len();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(vec!["BASE TABLE"; n])),
            Arc::new(BinaryArray::from(vec![ipc.0.as_ref(); n])),
        ],
    )
    .unwrap();
    MemoryRecordReader::new(schema, vec![batch])
}

fn sql_info_reader() -> MemoryRecordReader {
    let schema = Arc::new(Schema::new(vec![
        Field::new("info_name", DataType::Int64, false),
        Field::new("value", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![0, 1])),
            Arc::new(StringArray::from(vec!["mock", "1.0"])),
        ],
    )
    .unwrap();
    MemoryRecordReader::new(schema, vec![batch])
}

/// Pre-encoded Flight messages with fixed response headers
pub struct FlightDataStream {
    messages: VecDeque<FlightData>,
    header: Metadata,
}

impl FlightDataStream {
    pub async fn encode(batches: Vec<RecordBatch>, header: Metadata) -> Self {
        let messages: Vec<FlightData> = FlightDataEncoderBuilder::new()
            .build(stream::iter(batches.into_iter().map(Ok::<_, FlightError>)))
            .try_collect()
            .await
            .unwrap();
        Self {
            messages: messages.into(),
            header,
        }
    }
}

#[async_trait::async_trait]
impl RawStream for FlightDataStream {
    type Item = FlightData;

    async fn recv(&mut self) -> Result<Option<FlightData>, FlightError> {
        Ok(self.messages.pop_front())
    }

    fn header(&self) -> Result<Metadata, FlightError> {
        Ok(self.header.clone())
    }
}

fn requested_rows(sql: &str) -> Option<i64> {
    sql.split_whitespace()
        .find_map(|w| w.strip_prefix("rows:"))
        .and_then(|n| n.parse().ok())
}

#[async_trait::async_trait]
impl QueryEngine for MockEngine {
    async fn execute(&self, sql: &str) -> Result<Vec<Ticket>, EngineError> {
        if sql.contains("fail") {
            return Err(tonic::Status::internal("engine rejected query").into());
        }
        if sql.contains("no_endpoints") {
            return Ok(Vec::new());
        }
        if sql.contains("two_endpoints") {
            return Ok(vec![Ticket::new(sql.to_string()), Ticket::new(sql.to_string())]);
        }
        Ok(vec![Ticket::new(sql.to_string())])
    }

    async fn do_get(&self, ticket: Ticket) -> Result<Box<dyn RecordReader>, EngineError> {
        let sql = ticket_sql(&ticket);
        if sql.contains("panic") {
            panic!("engine exploded");
        }

        if sql.contains("flight") {
            let mut batches = Vec::new();
            let mut reader = value_reader(requested_rows(&sql).unwrap_or(1));
            while let Some(batch) = reader.next_batch().await? {
                batches.push(batch);
            }
            let mut header = Metadata::new();
            header.set("x-engine", "flight");
            let raw = FlightDataStream::encode(batches, header).await;
            let reader = FlightRecordReader::open(HeaderCapturingStream::new(raw)).await?;
            return Ok(Box::new(reader));
        }

        let reader = if sql == SQL_INFO_TICKET {
            sql_info_reader()
        } else if let Some(filter) = sql.strip_prefix(TABLES_TICKET) {
            tables_reader((!filter.is_empty()).then_some(filter))
        } else if sql.contains("empty") {
            MemoryRecordReader::new(value_schema(), Vec::new())
        } else if sql.contains("long") {
            long_reader()
        } else if let Some(n) = requested_rows(&sql) {
            value_reader(n)
        } else {
            value_reader(1)
        };

        let mut header = Metadata::new();
        header.set("x-engine", "mock");
        Ok(Box::new(reader.with_header(header)))
    }

    async fn get_tables(&self, command: CommandGetTables) -> Result<Vec<Ticket>, EngineError> {
        let filter = command.table_name_filter_pattern.unwrap_or_default();
        Ok(vec![Ticket::new(format!("{TABLES_TICKET}{filter}"))])
    }

    async fn get_sql_info(&self) -> Result<Vec<Ticket>, EngineError> {
        Ok(vec![Ticket::new(SQL_INFO_TICKET)])
    }
}

pub fn datasource() -> DataSource {
    DataSource::new(Arc::new(MockEngine))
}

/// A query item whose JSON payload carries `sql` and `format`
pub fn data_query(ref_id: &str, sql: &str, format: &str) -> DataQuery {
    DataQuery {
        ref_id: ref_id.to_string(),
        time_range: TimeRange::default(),
        json: json!({
            "refId": ref_id,
            "queryText": sql,
            "intervalMs": 1000,
            "maxDataPoints": 100,
            "format": format,
        }),
    }
}
