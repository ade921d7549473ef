//! Service Protocol
//!
//! HTTP surface of the service.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - /query: batch query execution                          |
//! |    - /health: engine health check                           |
//! |    - /plugin/macros, /flightsql/*: resources                |
//! +-------------------------------------------------------------+
//! |  Wire Format: JSON                                          |
//! |  Upstream: Arrow Flight SQL over gRPC                       |
//! +-------------------------------------------------------------+
//! ```

pub mod rest;

// Protocol Constants
/// Default HTTP server port
pub const DEFAULT_PORT: u16 = 8080;
