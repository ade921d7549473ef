//! HTTP API Module
//!
//! Batch query endpoint, schema resources, macro listing and health check.
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/query` | POST | run a batch of queries |
//! | `/health` | GET | `select 1` against the engine |
//! | `/plugin/macros` | GET | macro vocabulary |
//! | `/flightsql/sql-info` | GET | server SQL info |
//! | `/flightsql/tables` | GET | base tables |
//! | `/flightsql/columns?table=` | GET | schema of one table |

pub mod dto;
pub mod error;
pub mod handlers;

use std::any::Any;
use std::net::SocketAddr;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};

use crate::config::HttpConfig;
use crate::datasource::DataSource;
use crate::materialize::panic_message;

use self::error::RestError;
use self::handlers::{admin, flightsql, plugin, query};

/// Turn a handler panic into a 500 response
fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    tracing::error!(
        panic = %message,
        backtrace = %std::backtrace::Backtrace::force_capture(),
        "http_handler_panicked"
    );
    RestError::internal(format!("panic: {message}")).into_response()
}

/// Creates the Axum router
pub fn create_router(datasource: DataSource, config: &HttpConfig) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    };

    let mut app = Router::new()
        .route("/health", get(admin::health))
        .route("/query", post(query::query_data))
        .route("/plugin/macros", get(plugin::macros))
        .route("/flightsql/sql-info", get(flightsql::sql_info))
        .route("/flightsql/tables", get(flightsql::tables))
        .route("/flightsql/columns", get(flightsql::columns))
        .layer(Extension(datasource))
        .layer(CatchPanicLayer::custom(handle_panic));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM to trigger graceful shutdown.
/// In-flight query batches are dropped, which aborts their tasks.
pub async fn start_http_server(
    datasource: DataSource,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(datasource, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    tracing::info!(addr = %addr, "http_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http_server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!(signal = "SIGINT", "shutdown_requested"),
                    _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutdown_requested"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "sigterm_handler_unavailable");
                if let Err(e) = ctrl_c.await {
                    tracing::error!(error = %e, "ctrl_c_listener_failed");
                }
                tracing::info!(signal = "SIGINT", "shutdown_requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::error!(error = %e, "ctrl_c_listener_failed");
        }
        tracing::info!(signal = "SIGINT", "shutdown_requested");
    }
}
