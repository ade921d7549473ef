//! REST API Data Transfer Objects
//!
//! Request/response types of the resource and health endpoints. Query batches
//! and data responses are serialized as-is from [`crate::datasource`].

use serde::{Deserialize, Serialize};

use crate::datasource::HealthStatus;

/// Macro vocabulary: `{ "macros": [...] }`
#[derive(Debug, Serialize, Deserialize)]
pub struct MacrosDto {
    pub macros: Vec<String>,
}

/// Health check result
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: HealthStatus,
    pub message: String,
    pub version: String,
}

/// Query string of `/flightsql/columns`
#[derive(Debug, Default, Deserialize)]
pub struct ColumnsParams {
    #[serde(default)]
    pub table: Option<String>,
}
