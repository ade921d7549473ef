//! Admin Handlers
//!
//! Health check endpoint.

use axum::{http::StatusCode, Extension, Json};

use crate::datasource::{DataSource, HealthStatus};
use crate::protocol::rest::dto::HealthDto;

/// Health check: runs a trivial query against the engine.
///
/// Returns 503 when the engine cannot answer.
pub async fn health(Extension(datasource): Extension<DataSource>) -> (StatusCode, Json<HealthDto>) {
    let result = datasource.check_health().await;
    let status = match result.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = HealthDto {
        status: result.status,
        message: result.message,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (status, Json(body))
}
