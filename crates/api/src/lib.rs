//! HTTP adapter for the circulation engine.
//!
//! Exposes the checkout and return sagas over REST, with structured
//! logging (tracing) and Prometheus metrics. Business rules live in the
//! `saga` crate; this crate only wires stores and capabilities together and
//! maps failures to status codes.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{
    CheckoutProjector, CheckoutRecordStore, CheckpointStore, ItemProjector, ItemRowStore,
    ProjectionProcessor,
};
use saga::{
    CirculationSaga, HttpInventoryClient, HttpMembershipClient, InMemoryMembership, LocalInventory,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::{ApiError, SetupError};
pub use routes::circulation::{AppState, DynInventory, DynMembership, Saga};
pub use seed::{Seed, SeedError};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, R>(state: Arc<AppState<S, R>>, metrics_handle: PrometheusHandle) -> Router
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, R>))
        .route("/checkouts", post(routes::circulation::checkout::<S, R>))
        .route("/checkouts/{id}", get(routes::circulation::get::<S, R>))
        .route("/returns", post(routes::circulation::return_item::<S, R>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the inventory and membership capabilities the config asks for.
///
/// Without a catalog URL the item aggregates in `store` are used directly and
/// the seeded items are added to them. Without a membership URL an in-memory
/// directory holding the seeded members is used.
pub async fn build_capabilities<S, R>(
    config: &Config,
    store: S,
    item_rows: R,
    seed: &Seed,
) -> Result<(DynInventory, DynMembership), SetupError>
where
    S: EventStore + Clone + 'static,
    R: ItemRowStore + 'static,
{
    let inventory: DynInventory = match &config.catalog_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote catalog");
            if !seed.items.is_empty() {
                tracing::warn!("catalog is remote, ignoring seeded items");
            }
            Arc::new(HttpInventoryClient::new(&config.capability_config(url))?)
        }
        None => {
            let local = LocalInventory::new(store, item_rows);
            seed.apply_items(local.catalog()).await?;
            Arc::new(local)
        }
    };

    let membership: DynMembership = match &config.membership_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote membership");
            if !seed.members.is_empty() {
                tracing::warn!("membership is remote, ignoring seeded members");
            }
            Arc::new(HttpMembershipClient::new(&config.capability_config(url))?)
        }
        None => {
            if seed.members.is_empty() {
                tracing::warn!(
                    "neither MEMBERSHIP_SERVICE_URL nor seeded members, every checkout will be rejected"
                );
            }
            let directory = InMemoryMembership::new();
            seed.apply_members(&directory).await;
            Arc::new(directory)
        }
    };

    Ok((inventory, membership))
}

/// Creates the shared state around a saga built from `config`.
pub fn create_state<S, R>(
    config: &Config,
    store: S,
    records: R,
    inventory: DynInventory,
    membership: DynMembership,
) -> Arc<AppState<S, R>>
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    Arc::new(AppState {
        saga: CirculationSaga::new(store, records, inventory, membership, config.saga_config()),
        request_timeout: config.request_timeout,
    })
}

/// Creates a projection processor that keeps item rows and checkout records
/// in `read_models` up to date.
pub fn create_processor<S, R>(config: &Config, store: S, read_models: R) -> ProjectionProcessor<S>
where
    S: EventStore + Clone + 'static,
    R: ItemRowStore + CheckoutRecordStore + CheckpointStore + Clone + 'static,
{
    let mut processor = ProjectionProcessor::new(store, read_models.clone())
        .with_batch_size(config.projection_batch_size);
    processor.register(Box::new(ItemProjector::new(read_models.clone())));
    processor.register(Box::new(CheckoutProjector::new(read_models)));
    processor
}
