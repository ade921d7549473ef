//! Flight SQL Frames Server Binary
//!
//! Connects to a Flight SQL engine and serves the batch query API over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with config.toml / config.local.toml / FLIGHTSQL_* overrides
//! cargo run --bin flightsql-frames-server
//!
//! # Explicit config file and bind address
//! cargo run --bin flightsql-frames-server -- --config prod.toml --host 0.0.0.0 --port 9090
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flightsql_frames::config::LoggingConfig;
use flightsql_frames::protocol::rest;
use flightsql_frames::{Config, DataSource};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(name = "flightsql-frames-server", version, about)]
struct Args {
    /// Configuration file (defaults to config.toml + config.local.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind host, overrides [http].host
    #[arg(long)]
    host: Option<String>,

    /// HTTP port, overrides [http].port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };

    init_tracing(&config.logging);

    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    let datasource = DataSource::from_config(&config)
        .await
        .context("initializing flightsql datasource")?;

    tracing::info!(
        addr = %config.flightsql.addr,
        secure = config.flightsql.secure,
        max_rows = config.query.max_rows,
        "datasource_ready"
    );

    rest::start_http_server(datasource, &config.http)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = logging_config.format == "json";

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match &logging_config.file {
        Some(path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open log file '{path}': {e}");
                    return;
                }
            };
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = TRACE_GUARD.set(guard);

            let base = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(non_blocking);
            if json {
                Box::new(base.json().finish())
            } else {
                Box::new(base.compact().finish())
            }
        }
        None => {
            let base = tracing_subscriber::fmt().with_env_filter(filter);
            if json {
                Box::new(base.json().finish())
            } else {
                Box::new(base.compact().finish())
            }
        }
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
