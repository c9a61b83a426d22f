//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use projections::DEFAULT_BATCH_SIZE;
use saga::{HttpCapabilityConfig, SagaConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for plain text
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on in-memory stores
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `CATALOG_SERVICE_URL`: remote catalog; unset uses the local catalog
/// - `MEMBERSHIP_SERVICE_URL`: remote membership; unset uses an in-memory
///   directory
/// - `SEED_FILE`: JSON members and items for the in-process capabilities
/// - `LOAN_PERIOD_DAYS`: loan length (default: `14`)
/// - `REQUEST_TIMEOUT_MS`: saga deadline per request (default: `5000`)
/// - `COMPENSATION_TIMEOUT_MS`: bound on each compensation (default: `2000`)
/// - `PROJECTION_BATCH_SIZE`: events per catch-up page (default: `256`)
/// - `CAPABILITY_TIMEOUT_MS`: HTTP client timeout (default: `3000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub catalog_service_url: Option<String>,
    pub membership_service_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub loan_period_days: i64,
    pub request_timeout: Duration,
    pub compensation_timeout: Duration,
    pub projection_batch_size: usize,
    pub capability_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            non_empty(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            catalog_service_url: non_empty("CATALOG_SERVICE_URL"),
            membership_service_url: non_empty("MEMBERSHIP_SERVICE_URL"),
            seed_file: non_empty("SEED_FILE").map(PathBuf::from),
            loan_period_days: non_empty("LOAN_PERIOD_DAYS")
                .and_then(|v| v.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(defaults.loan_period_days),
            request_timeout: millis("REQUEST_TIMEOUT_MS", defaults.request_timeout),
            compensation_timeout: millis("COMPENSATION_TIMEOUT_MS", defaults.compensation_timeout),
            projection_batch_size: non_empty("PROJECTION_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.projection_batch_size),
            capability_timeout: millis("CAPABILITY_TIMEOUT_MS", defaults.capability_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            loan_period: chrono::Duration::days(self.loan_period_days),
            compensation_timeout: self.compensation_timeout,
        }
    }

    /// HTTP settings for a remote capability at `base_url`.
    pub fn capability_config(&self, base_url: &str) -> HttpCapabilityConfig {
        HttpCapabilityConfig::new(base_url, self.capability_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            catalog_service_url: None,
            membership_service_url: None,
            seed_file: None,
            loan_period_days: 14,
            request_timeout: Duration::from_millis(5000),
            compensation_timeout: Duration::from_millis(2000),
            projection_batch_size: DEFAULT_BATCH_SIZE,
            capability_timeout: Duration::from_millis(3000),
        }
    }
}
