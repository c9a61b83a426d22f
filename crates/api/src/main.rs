//! Circulation server entry point.

use std::error::Error;
use std::time::Duration;

use api::{Config, Seed};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use projections::{
    CheckoutRecordStore, CheckpointStore, InMemoryReadModels, ItemRowStore, PostgresReadModels,
};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;

/// How often the projection processor polls the log.
const PROJECTION_POLL_INTERVAL: Duration = Duration::from_millis(500);

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    api::telemetry::init_tracing(&config)?;

    // 2. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    api::telemetry::describe_metrics();

    // 3. Pick the storage backend
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");
            serve(config, store, PostgresReadModels::new(pool), metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            serve(
                config,
                InMemoryEventStore::new(),
                InMemoryReadModels::new(),
                metrics_handle,
            )
            .await
        }
    }
}

async fn serve<S, R>(
    config: Config,
    store: S,
    read_models: R,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    S: EventStore + Clone + 'static,
    R: ItemRowStore + CheckoutRecordStore + CheckpointStore + Clone + 'static,
{
    // 4. Wire capabilities, saga and projections
    let seed = match &config.seed_file {
        Some(path) => Seed::load(path).await?,
        None => Seed::default(),
    };
    let (inventory, membership) =
        api::build_capabilities(&config, store.clone(), read_models.clone(), &seed).await?;
    let state = api::create_state(
        &config,
        store.clone(),
        read_models.clone(),
        inventory,
        membership,
    );

    let processor = api::create_processor(&config, store, read_models);
    let replayed = processor.run_catch_up().await?;
    tracing::info!(
        replayed,
        projections = processor.projection_count(),
        "projections caught up"
    );

    let (stop_tx, mut stop_rx) = watch::channel(());
    let projections = tokio::spawn(async move {
        processor
            .run(PROJECTION_POLL_INTERVAL, async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    // 5. Start server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting circulation server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(());
        })
        .await?;

    projections.await?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
