//! Query Dispatcher
//!
//! [`DataSource`] answers a batch of queries. Each item is decoded and macro
//! expanded up front; the remaining queries run concurrently, one tokio task
//! per query, and every outcome is stored under the item's correlation id.
//! A failure or panic inside one query only ever affects that query's entry.
//!
//! The same type also serves the health check and schema introspection
//! (SQL info, tables, columns), each bounded by the resource timeout.

use crate::config::Config;
use crate::engine::{EngineError, FlightSqlEngine, QueryEngine};
use crate::frame::Frame;
use crate::macros::MacroRegistry;
use crate::materialize::{
    frame_for_records, new_frame, panic_message, MaterializeError, Materializer, Progress,
    RecordReader, ROW_LIMIT,
};
use crate::query::{decode_query_request, DataQuery, Query, QueryError};
use crate::shape::{format_frame, ShapeError};
use arrow::array::{Array, AsArray};
use arrow::error::ArrowError;
use arrow::ipc::convert::try_schema_from_ipc_buffer;
use arrow_flight::sql::CommandGetTables;
use arrow_flight::Ticket;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

/// Table types listed by the tables resource
pub const TABLE_TYPES: [&str; 2] = ["BASE TABLE", "table"];

/// SQL run by the health check
pub const HEALTH_CHECK_SQL: &str = "select 1";

/// Default timeout of health and schema calls
pub const RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome status, serialized as its HTTP code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    BadRequest,
    NotFound,
    Internal,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::Internal => 500,
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// Outcome of one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: Status,
}

impl DataResponse {
    pub fn ok(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            error: None,
            status: Status::Ok,
        }
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.into()),
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One item of a batch.
///
/// Items that do not decode as a [`DataQuery`] are kept raw so they fail on
/// their own instead of rejecting the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryItem {
    Query(DataQuery),
    Invalid(Value),
}

impl QueryItem {
    /// Correlation id of the item, empty if it has none
    pub fn ref_id(&self) -> &str {
        match self {
            QueryItem::Query(q) => &q.ref_id,
            QueryItem::Invalid(v) => v.get("refId").and_then(Value::as_str).unwrap_or_default(),
        }
    }
}

impl From<DataQuery> for QueryItem {
    fn from(query: DataQuery) -> Self {
        QueryItem::Query(query)
    }
}

/// A batch of queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDataRequest {
    #[serde(default)]
    pub queries: Vec<QueryItem>,
}

impl QueryDataRequest {
    pub fn new(queries: impl IntoIterator<Item = DataQuery>) -> Self {
        Self {
            queries: queries.into_iter().map(QueryItem::from).collect(),
        }
    }
}

/// Outcomes of a batch, keyed by correlation id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDataResponse {
    pub results: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn get(&self, ref_id: &str) -> Option<&DataResponse> {
        self.results.get(ref_id)
    }
}

/// Batch-level failure; individual query failures never surface here
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("query task did not complete: {0}")]
    Join(#[from] JoinError),
}

/// Failure of one query's execution
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("flightsql: {0}")]
    Engine(#[from] EngineError),

    #[error("unsupported endpoint count in response: {0}")]
    EndpointCount(usize),

    #[error("{0}")]
    Materialize(#[from] MaterializeError),

    #[error("{0}")]
    Shape(#[from] ShapeError),
}

/// Failure of a health or schema call
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Materialize(#[from] MaterializeError),

    #[error("no endpoint in response")]
    NoEndpoint,

    #[error("table not found")]
    TableNotFound,

    #[error("table_schema field not found")]
    SchemaFieldMissing,

    #[error("decode table schema: {0}")]
    Schema(#[source] ArrowError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ResourceError {
    pub fn status(&self) -> Status {
        match self {
            ResourceError::TableNotFound => Status::NotFound,
            _ => Status::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
}

/// Dispatcher over a shared [`QueryEngine`]
#[derive(Clone)]
pub struct DataSource {
    engine: Arc<dyn QueryEngine>,
    macros: Arc<MacroRegistry>,
    max_rows: usize,
    resource_timeout: Duration,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("macros", &self.macros)
            .field("max_rows", &self.max_rows)
            .field("resource_timeout", &self.resource_timeout)
            .finish_non_exhaustive()
    }
}

impl DataSource {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            macros: Arc::new(MacroRegistry::builtin()),
            max_rows: ROW_LIMIT,
            resource_timeout: RESOURCE_TIMEOUT,
        }
    }

    /// Validate `config` and connect a Flight SQL engine
    pub async fn from_config(config: &Config) -> Result<Self, crate::Error> {
        config.validate()?;
        let metadata = config.flightsql.create_metadata();
        let engine = FlightSqlEngine::connect(&config.flightsql, metadata).await?;
        Ok(Self::new(Arc::new(engine))
            .with_max_rows(config.query.max_rows)
            .with_resource_timeout(config.query.resource_timeout()))
    }

    pub fn with_macros(mut self, macros: MacroRegistry) -> Self {
        self.macros = Arc::new(macros);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_resource_timeout(mut self, timeout: Duration) -> Self {
        self.resource_timeout = timeout;
        self
    }

    /// Sorted names of the available macros
    pub fn macro_names(&self) -> Vec<String> {
        self.macros.names()
    }

    /// Run a batch of queries.
    ///
    /// Waits for every query; dropping the returned future aborts the ones
    /// still running.
    pub async fn query_data(
        &self,
        request: QueryDataRequest,
    ) -> Result<QueryDataResponse, DispatchError> {
        let mut response = QueryDataResponse::default();
        let mut tasks = JoinSet::new();

        for item in request.queries {
            let ref_id = item.ref_id().to_string();
            let decoded = match &item {
                QueryItem::Query(data_query) => decode_query_request(data_query, &self.macros),
                QueryItem::Invalid(value) => DataQuery::deserialize(value)
                    .map_err(QueryError::from)
                    .and_then(|data_query| decode_query_request(&data_query, &self.macros)),
            };
            let query = match decoded {
                Ok(query) => query,
                Err(e) => {
                    tracing::debug!(ref_id = %ref_id, error = %e, "query_rejected");
                    response
                        .results
                        .insert(ref_id, DataResponse::error(Status::BadRequest, e.to_string()));
                    continue;
                }
            };

            if query.raw_sql.trim().is_empty() {
                response
                    .results
                    .insert(query.ref_id, DataResponse::ok(Vec::new()));
                continue;
            }

            let this = self.clone();
            let span = tracing::info_span!("query", ref_id = %query.ref_id);
            tasks.spawn(
                async move {
                    let ref_id = query.ref_id.clone();
                    let outcome = AssertUnwindSafe(this.query(query)).catch_unwind().await;
                    let response = outcome.unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(
                            ref_id = %ref_id,
                            panic = %message,
                            backtrace = %std::backtrace::Backtrace::force_capture(),
                            "query_panicked"
                        );
                        DataResponse::error(Status::Internal, format!("panic: {message}"))
                    });
                    (ref_id, response)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let (ref_id, outcome) = joined?;
            response.results.insert(ref_id, outcome);
        }
        Ok(response)
    }

    /// Execute one decoded query
    pub async fn query(&self, query: Query) -> DataResponse {
        match self.execute(&query).await {
            Ok(frames) => DataResponse::ok(frames),
            Err(e) => {
                tracing::warn!(ref_id = %query.ref_id, error = %e, "query_failed");
                DataResponse::error(Status::Internal, e.to_string())
            }
        }
    }

    async fn execute(&self, query: &Query) -> Result<Vec<Frame>, ExecuteError> {
        let tickets = self.engine.execute(&query.raw_sql).await?;
        let [ticket] = <[Ticket; 1]>::try_from(tickets)
            .map_err(|tickets| ExecuteError::EndpointCount(tickets.len()))?;

        let mut reader = self.engine.do_get(ticket).await?;
        new_query_data_response(reader.as_mut(), query, self.max_rows).await
    }

    /// Run `select 1` as a table query
    pub async fn check_health(&self) -> HealthCheckResult {
        let query = Query::table(HEALTH_CHECK_SQL);
        let outcome = self
            .with_timeout(async { self.execute(&query).await.map_err(|e| e.to_string()) })
            .await
            .unwrap_or_else(|e| Err(e.to_string()));

        match outcome {
            Ok(_) => HealthCheckResult {
                status: HealthStatus::Ok,
                message: "OK".to_string(),
            },
            Err(message) => {
                tracing::warn!(error = %message, "health_check_failed");
                HealthCheckResult {
                    status: HealthStatus::Error,
                    message: format!("ERROR: {message}"),
                }
            }
        }
    }

    /// Server SQL info as one frame
    pub async fn sql_info(&self) -> Result<DataResponse, ResourceError> {
        self.with_timeout(async {
            let tickets = self.engine.get_sql_info().await?;
            self.resource_frame(tickets).await
        })
        .await?
    }

    /// Base tables as one frame
    pub async fn tables(&self) -> Result<DataResponse, ResourceError> {
        self.with_timeout(async {
            let command = CommandGetTables {
                table_types: TABLE_TYPES.iter().map(|t| (*t).to_string()).collect(),
                ..CommandGetTables::default()
            };
            let tickets = self.engine.get_tables(command).await?;
            self.resource_frame(tickets).await
        })
        .await?
    }

    /// Empty frame carrying the schema of `table`
    pub async fn columns(&self, table: &str) -> Result<DataResponse, ResourceError> {
        self.with_timeout(async {
            let command = CommandGetTables {
                table_name_filter_pattern: Some(table.to_string()),
                include_schema: true,
                ..CommandGetTables::default()
            };
            let tickets = self.engine.get_tables(command).await?;
            let ticket = tickets.into_iter().next().ok_or(ResourceError::NoEndpoint)?;
            let mut reader = self.engine.do_get(ticket).await?;

            let batch = reader
                .next_batch()
                .await
                .map_err(MaterializeError::from)?
                .ok_or(ResourceError::TableNotFound)?;
            if batch.num_rows() == 0 {
                return Err(ResourceError::TableNotFound);
            }
            while reader
                .next_batch()
                .await
                .map_err(MaterializeError::from)?
                .is_some()
            {}

            let column = batch
                .column_by_name("table_schema")
                .ok_or(ResourceError::SchemaFieldMissing)?;
            if column.is_null(0) {
                return Err(ResourceError::SchemaFieldMissing);
            }
            let bytes: Vec<u8> = if let Some(col) = column.as_binary_opt::<i32>() {
                col.value(0).to_vec()
            } else if let Some(col) = column.as_string_opt::<i32>() {
                col.value(0).as_bytes().to_vec()
            } else {
                return Err(ResourceError::SchemaFieldMissing);
            };

            let schema = try_schema_from_ipc_buffer(&bytes).map_err(ResourceError::Schema)?;
            Ok(DataResponse::ok(vec![new_frame(&schema)]))
        })
        .await?
    }

    async fn resource_frame(&self, tickets: Vec<Ticket>) -> Result<DataResponse, ResourceError> {
        let ticket = tickets.into_iter().next().ok_or(ResourceError::NoEndpoint)?;
        let mut reader = self.engine.do_get(ticket).await?;
        let frame = drain_frame(reader.as_mut(), self.max_rows).await?;
        Ok(DataResponse::ok(vec![frame]))
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = T>) -> Result<T, ResourceError> {
        tokio::time::timeout(self.resource_timeout, fut)
            .await
            .map_err(|_| ResourceError::Timeout(self.resource_timeout))
    }
}

/// Drain `reader` into one frame, even when it has no rows
async fn drain_frame(
    reader: &mut dyn RecordReader,
    max_rows: usize,
) -> Result<Frame, MaterializeError> {
    let mut materializer = Materializer::new(&reader.schema(), max_rows);
    while let Some(batch) = reader.next_batch().await? {
        if materializer.append_batch(&batch)? == Progress::Full {
            break;
        }
    }
    Ok(materializer.finish())
}

/// Materialize `reader`, annotate with the query and headers, and shape it
pub async fn new_query_data_response(
    reader: &mut dyn RecordReader,
    query: &Query,
    max_rows: usize,
) -> Result<Vec<Frame>, ExecuteError> {
    let frames = frame_for_records(reader, max_rows).await?;

    let headers = reader.header().unwrap_or_else(|e| {
        tracing::warn!(ref_id = %query.ref_id, error = %e, "header_extraction_failed");
        Default::default()
    });
    let headers = serde_json::to_value(&headers).unwrap_or_default();

    let mut shaped = Vec::with_capacity(frames.len());
    for mut frame in frames {
        frame.meta.executed_query_string = Some(query.raw_sql.clone());
        frame.meta.data_topic = Some(query.raw_sql.clone());
        frame
            .meta
            .custom
            .insert("headers".to_string(), headers.clone());
        shaped.extend(format_frame(frame, query.format)?);
    }
    Ok(shaped)
}
