//! REST API Handlers
//!
//! Contains all HTTP endpoint handlers organized by domain.

pub mod admin;
pub mod flightsql;
pub mod plugin;
pub mod query;
