//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (FLIGHTSQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [flightsql]
//! addr = "localhost:8082"
//! secure = true
//! token = "..."
//! metadata = [{ database = "metrics" }, { "x-org" = "acme" }]
//!
//! [query]
//! max_rows = 1000000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FLIGHTSQL_FLIGHTSQL__ADDR=influx:443
//! FLIGHTSQL_HTTP__PORT=9090
//! ```

use crate::materialize::ROW_LIMIT;
use crate::metadata::Metadata;
use crate::protocol::DEFAULT_PORT;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flightsql: FlightSqlConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Flight SQL connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightSqlConfig {
    /// Server address as host:port
    #[serde(default)]
    pub addr: String,

    /// Use TLS with the system roots
    #[serde(default)]
    pub secure: bool,

    /// Static metadata sent with every call; the first value of a key wins
    #[serde(default)]
    pub metadata: Vec<BTreeMap<String, String>>,

    /// Basic auth username (handshake)
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Bearer token; takes precedence over username/password
    #[serde(default)]
    pub token: String,
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Row cap of one frame
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Timeout of health and schema calls in milliseconds
    #[serde(default = "default_resource_timeout_ms")]
    pub resource_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,
}

fn default_max_rows() -> usize {
    ROW_LIMIT
}
fn default_resource_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    DEFAULT_PORT
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            max_rows: default_max_rows(),
            resource_timeout_ms: default_resource_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("server address must be in the format host:port")]
    InvalidAddr,

    #[error("token or username/password are required for a secure connection")]
    MissingCredentials,

    #[error("max_rows must be greater than zero")]
    ZeroRowLimit,
}

impl FlightSqlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.addr.contains(':') {
            return Err(ConfigError::InvalidAddr);
        }
        let basic_auth = !self.username.is_empty() && !self.password.is_empty();
        if self.secure && self.token.is_empty() && !basic_auth {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }

    /// Static call metadata: configured pairs (first key wins, empty keys
    /// skipped) plus the bearer token
    pub fn create_metadata(&self) -> Metadata {
        let mut md = Metadata::new();
        for pairs in &self.metadata {
            for (key, value) in pairs {
                if key.is_empty() || md.contains_key(key) {
                    continue;
                }
                md.set(key, value.clone());
            }
        }
        if !self.token.is_empty() {
            md.set("authorization", format!("Bearer {}", self.token));
        }
        md
    }
}

impl QueryConfig {
    pub fn resource_timeout(&self) -> Duration {
        Duration::from_millis(self.resource_timeout_ms)
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (FLIGHTSQL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("FLIGHTSQL_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FLIGHTSQL_").split("__"))
            .extract()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flightsql.validate()?;
        if self.query.max_rows == 0 {
            return Err(ConfigError::ZeroRowLimit);
        }
        Ok(())
    }
}
