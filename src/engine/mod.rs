//! Query engine boundary
//!
//! The dispatcher talks to the columnar engine only through [`QueryEngine`]:
//! plan a query into tickets, then fetch each ticket as a record stream.
//! [`FlightSqlEngine`] implements it over Arrow Flight SQL.

mod flight;

pub use flight::FlightSqlEngine;

use crate::materialize::RecordReader;
use arrow::error::ArrowError;
use arrow_flight::error::FlightError;
use arrow_flight::sql::CommandGetTables;
use arrow_flight::Ticket;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Arrow(#[from] ArrowError),

    #[error("{0}")]
    Flight(#[from] FlightError),

    #[error("{}", .0.message())]
    Status(#[from] tonic::Status),

    #[error("transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid metadata {key}: {message}")]
    InvalidMetadata { key: String, message: String },

    #[error("endpoint {0} has no ticket")]
    MissingTicket(usize),
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Plan `sql`; returns one ticket per endpoint
    async fn execute(&self, sql: &str) -> Result<Vec<Ticket>, EngineError>;

    /// Open the record stream of a ticket
    async fn do_get(&self, ticket: Ticket) -> Result<Box<dyn RecordReader>, EngineError>;

    async fn get_tables(&self, command: CommandGetTables) -> Result<Vec<Ticket>, EngineError>;

    /// All server SQL info
    async fn get_sql_info(&self) -> Result<Vec<Ticket>, EngineError>;
}
