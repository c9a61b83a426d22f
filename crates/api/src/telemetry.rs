//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::{Config, LogFormat};

/// Installs the global subscriber: `RUST_LOG`-style filter from the config
/// and plain or JSON output.
pub fn init_tracing(config: &Config) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Registers help text for the metrics the engine emits.
pub fn describe_metrics() {
    metrics::describe_counter!("event_store_appends_total", "Committed appends");
    metrics::describe_counter!(
        "event_store_concurrency_conflicts_total",
        "Appends rejected because the stream moved on"
    );
    metrics::describe_counter!("saga_started_total", "Saga runs started");
    metrics::describe_counter!("saga_completed_total", "Saga runs that reached Published");
    metrics::describe_counter!("saga_failed_total", "Saga runs that ended in Failed");
    metrics::describe_counter!("saga_compensations_total", "Compensations attempted");
    metrics::describe_counter!(
        "saga_compensation_failures_total",
        "Compensations that failed and need manual reconciliation"
    );
    metrics::describe_histogram!(
        "saga_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of a saga run"
    );
    metrics::describe_counter!(
        "projections_events_processed",
        "Events delivered to projections"
    );
}
