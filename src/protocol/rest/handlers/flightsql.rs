//! Flight SQL Schema Handlers
//!
//! Introspection endpoints; each answers with a data response holding one
//! frame.

use axum::{extract::Query, Extension, Json};

use crate::datasource::{DataResponse, DataSource};
use crate::protocol::rest::dto::ColumnsParams;
use crate::protocol::rest::error::RestError;

/// Server SQL info
pub async fn sql_info(
    Extension(datasource): Extension<DataSource>,
) -> Result<Json<DataResponse>, RestError> {
    Ok(Json(datasource.sql_info().await?))
}

/// Base tables
pub async fn tables(
    Extension(datasource): Extension<DataSource>,
) -> Result<Json<DataResponse>, RestError> {
    Ok(Json(datasource.tables().await?))
}

/// Columns of `?table=`, as an empty frame with the table's schema
pub async fn columns(
    Extension(datasource): Extension<DataSource>,
    Query(params): Query<ColumnsParams>,
) -> Result<Json<DataResponse>, RestError> {
    let table = params
        .table
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RestError::bad_request(r#"query parameter "table" is required"#))?;
    Ok(Json(datasource.columns(&table).await?))
}
