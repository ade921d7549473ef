//! Query Model
//!
//! Inbound query items, their JSON payload, and the decoded [`Query`] that the
//! dispatcher executes. Decoding also runs the macro engine, so a [`Query`]
//! always carries fully expanded SQL.

use crate::macros::{interpolate, MacroContext, MacroError, MacroRegistry};
use crate::shape::Format;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Absolute time window of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            from: now - chrono::Duration::hours(1),
            to: now,
        }
    }
}

/// One query of an inbound batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    /// Correlation identifier routed back with the outcome
    pub ref_id: String,

    #[serde(default)]
    pub time_range: TimeRange,

    /// Query payload, decoded into a [`QueryRequest`]
    #[serde(default)]
    pub json: serde_json::Value,
}

/// JSON payload of a [`DataQuery`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub ref_id: String,

    #[serde(default, rename = "queryText")]
    pub text: String,

    #[serde(default, rename = "intervalMs")]
    pub interval_milliseconds: u64,

    #[serde(default)]
    pub max_data_points: i64,

    #[serde(default)]
    pub format: String,
}

/// A decoded, macro-expanded query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub raw_sql: String,
    pub ref_id: String,
    pub format: Format,
    pub time_range: TimeRange,
    pub interval: Duration,
    pub max_data_points: i64,
}

impl Query {
    /// A table-formatted query for internal use (health checks)
    pub fn table(sql: impl Into<String>) -> Self {
        Self {
            raw_sql: sql.into(),
            ref_id: String::new(),
            format: Format::Table,
            time_range: TimeRange::default(),
            interval: Duration::ZERO,
            max_data_points: 0,
        }
    }

    pub fn macro_context(&self) -> MacroContext {
        MacroContext::new(self.time_range, self.interval)
    }
}

/// Errors decoding an inbound query
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unmarshal json: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("interpolate macros: {0}")]
    Interpolate(#[from] MacroError),
}

/// Decode a [`DataQuery`] and expand its macros.
///
/// The outcome is keyed by the item's own correlation identifier, not the one
/// repeated inside the JSON payload.
pub fn decode_query_request(
    data_query: &DataQuery,
    registry: &MacroRegistry,
) -> Result<Query, QueryError> {
    let request = QueryRequest::deserialize(&data_query.json)?;

    let mut query = Query {
        raw_sql: request.text,
        ref_id: data_query.ref_id.clone(),
        format: Format::from_request(&request.format),
        time_range: data_query.time_range,
        interval: Duration::from_millis(request.interval_milliseconds),
        max_data_points: request.max_data_points,
    };

    query.raw_sql = interpolate(&query.raw_sql, &query.macro_context(), registry)?;
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn data_query(payload: serde_json::Value) -> DataQuery {
        DataQuery {
            ref_id: "A".to_string(),
            time_range: TimeRange::new(
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 10, 0).unwrap(),
            ),
            json: payload,
        }
    }

    #[test]
    fn test_decode_expands_macros() {
        let dq = data_query(json!({
            "refId": "A",
            "queryText": "select * from x where $__timeRange(time)",
            "intervalMs": 10_000,
            "format": "table"
        }));
        let q = decode_query_request(&dq, &MacroRegistry::builtin()).unwrap();
        assert_eq!(
            q.raw_sql,
            "select * from x where time >= '2023-01-01T00:00:00Z' AND time <= '2023-01-01T00:10:00Z'"
        );
        assert_eq!(q.format, Format::Table);
        assert_eq!(q.interval, Duration::from_secs(10));
        assert_eq!(q.ref_id, "A");
    }

    #[test]
    fn test_non_table_format_defaults_to_time_series() {
        for format in ["", "time_series", "logs", "whatever"] {
            let dq = data_query(json!({ "queryText": "select 1", "format": format }));
            let q = decode_query_request(&dq, &MacroRegistry::builtin()).unwrap();
            assert_eq!(q.format, Format::TimeSeries, "format {format:?}");
        }
    }

    #[test]
    fn test_malformed_payload() {
        let dq = data_query(json!({ "queryText": 42 }));
        let err = decode_query_request(&dq, &MacroRegistry::builtin()).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
        assert!(err.to_string().starts_with("unmarshal json:"));
    }

    #[test]
    fn test_macro_failure() {
        let dq = data_query(json!({ "queryText": "select $__dateBin()" }));
        let err = decode_query_request(&dq, &MacroRegistry::builtin()).unwrap_err();
        assert!(matches!(err, QueryError::Interpolate(_)));
        assert!(err.to_string().starts_with("interpolate macros:"));
    }

    #[test]
    fn test_ref_id_comes_from_item() {
        let dq = data_query(json!({ "refId": "other", "queryText": "" }));
        let q = decode_query_request(&dq, &MacroRegistry::builtin()).unwrap();
        assert_eq!(q.ref_id, "A");
        assert!(q.raw_sql.is_empty());
    }

    #[test]
    fn test_data_query_deserializes_camel_case() {
        let dq: DataQuery = serde_json::from_value(json!({
            "refId": "B",
            "timeRange": { "from": "2023-01-01T00:00:00Z", "to": "2023-01-02T00:00:00Z" },
            "json": { "queryText": "select 1" }
        }))
        .unwrap();
        assert_eq!(dq.ref_id, "B");
        assert_eq!(
            dq.time_range.to,
            Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
        );
    }
}
