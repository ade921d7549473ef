//! Plugin Handlers

use axum::{Extension, Json};

use crate::datasource::DataSource;
use crate::protocol::rest::dto::MacrosDto;

/// Sorted macro names usable in query text
pub async fn macros(Extension(datasource): Extension<DataSource>) -> Json<MacrosDto> {
    Json(MacrosDto {
        macros: datasource.macro_names(),
    })
}
