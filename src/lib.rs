//! # Flight SQL Frames
//!
//! Runs templated SQL against a columnar engine reachable over Arrow Flight
//! SQL and materializes the streamed record batches into tabular frames for a
//! visualization layer.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Query batch (refId, time range, JSON payload)
//!     ↓
//! [Query decoding + Macro Engine]   → Query with expanded SQL
//!     ↓                               (one tokio task per query)
//! [QueryEngine::execute]            → exactly one ticket
//!     ↓
//! [QueryEngine::do_get]             → header-capturing record stream
//!     ↓
//! [Materializer]                    → Frame (row cap, null/type rules)
//!     ↓
//! [Response Shaper]                 → table | logs | wide time series
//!     ↓
//! QueryDataResponse keyed by refId
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flightsql_frames::{Config, DataSource, QueryDataRequest};
//!
//! let config = Config::load()?;
//! let datasource = DataSource::from_config(&config).await?;
//!
//! let request: QueryDataRequest = serde_json::from_str(body)?;
//! let response = datasource.query_data(request).await?;
//! for (ref_id, outcome) in &response.results {
//!     println!("{ref_id}: {} frame(s)", outcome.frames.len());
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `macros` | `$__name(args)` SQL rewriting |
//! | `metadata` | gRPC header map |
//! | `stream` | run-once header capture, Flight decoding |
//! | `frame` | typed columns, long → wide reshaping |
//! | `materialize` | record batches → frame |
//! | `shape` | table / logs / time series layout |
//! | `query` | query payload decoding |
//! | `engine` | Flight SQL client boundary |
//! | `datasource` | concurrent dispatcher, health, schema resources |
//! | `config` | figment configuration |
//! | `protocol` | HTTP API |

pub mod config;
pub mod datasource;
pub mod engine;
pub mod frame;
pub mod macros;
pub mod materialize;
pub mod metadata;
pub mod protocol;
pub mod query;
pub mod shape;
pub mod stream;

// Re-export public types
pub use config::{Config, ConfigError};
pub use datasource::{
    DataResponse, DataSource, DispatchError, HealthCheckResult, HealthStatus, QueryDataRequest,
    QueryDataResponse, QueryItem, Status,
};
pub use engine::{EngineError, FlightSqlEngine, QueryEngine};
pub use frame::{Field, FieldData, FieldType, Frame, FrameMeta, Notice, Severity};
pub use macros::{interpolate, MacroContext, MacroError, MacroRegistry};
pub use materialize::{frame_for_records, MaterializeError, RecordReader, ROW_LIMIT};
pub use metadata::Metadata;
pub use query::{decode_query_request, DataQuery, Query, QueryError, TimeRange};
pub use shape::{format_frame, Format, ShapeError};

/// Errors building a [`DataSource`] from configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("flightsql client: {0}")]
    Engine(#[from] EngineError),
}
