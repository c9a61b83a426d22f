//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::AggregateId;
use event_store::EventStore;
use projections::CheckoutRecordStore;
use serde::Serialize;

use super::circulation::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub read_models: &'static str,
}

/// GET /health: reports whether the checkout records can be read.
pub async fn check<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
) -> (StatusCode, Json<HealthResponse>)
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    let probe = AggregateId::new();
    match state.saga.records().get_checkout_record(probe).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                read_models: "ok",
            }),
        ),
        Err(error) => {
            tracing::warn!(%error, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    read_models: "unavailable",
                }),
            )
        }
    }
}
