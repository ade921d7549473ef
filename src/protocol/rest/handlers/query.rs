//! Query Handlers
//!
//! Batch query execution.

use std::time::Instant;

use axum::{extract::rejection::JsonRejection, Extension, Json};

use crate::datasource::{DataSource, QueryDataRequest, QueryDataResponse};
use crate::protocol::rest::error::RestError;

/// Execute a batch of queries.
///
/// Per-query failures, including items that do not decode, are reported
/// inside the response; only a body that is not a batch or a batch that could
/// not complete is an HTTP error.
pub async fn query_data(
    Extension(datasource): Extension<DataSource>,
    payload: Result<Json<QueryDataRequest>, JsonRejection>,
) -> Result<Json<QueryDataResponse>, RestError> {
    let Json(request) = payload.map_err(|e| RestError::bad_request(e.body_text()))?;
    let start = Instant::now();
    let queries = request.queries.len();

    let response = datasource.query_data(request).await?;

    let failed = response.results.values().filter(|r| r.is_error()).count();
    tracing::info!(
        queries,
        failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "query_batch_completed"
    );
    Ok(Json(response))
}
