//! Checkout and return endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, MemberId};
use domain::CheckoutStatus;
use event_store::EventStore;
use projections::{CheckoutRecord, CheckoutRecordStore};
use saga::{CirculationSaga, Deadline, InventoryCapability, MembershipCapability};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub type DynInventory = Arc<dyn InventoryCapability>;
pub type DynMembership = Arc<dyn MembershipCapability>;

/// Saga wired to whichever capabilities the process was configured with.
pub type Saga<S, R> = CirculationSaga<S, R, DynInventory, DynMembership>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore, R: CheckoutRecordStore> {
    pub saga: Saga<S, R>,
    /// Deadline given to each saga call.
    pub request_timeout: Duration,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CirculationRequest {
    pub member_id: MemberId,
    pub item_id: AggregateId,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub id: AggregateId,
    pub member_id: MemberId,
    pub item_id: AggregateId,
    pub status: CheckoutStatus,
    pub checkout_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<CheckoutRecord> for CheckoutResponse {
    fn from(record: CheckoutRecord) -> Self {
        Self {
            id: record.checkout_id,
            member_id: record.member_id,
            item_id: record.item_id,
            status: record.status,
            checkout_date: record.checkout_date,
            due_date: record.due_date,
            return_date: record.return_date,
            version: record.version.as_i64(),
        }
    }
}

// -- Handlers --

/// POST /checkouts: check an item out to a member.
#[tracing::instrument(skip(state))]
pub async fn checkout<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Json(req): Json<CirculationRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    let deadline = Deadline::after(state.request_timeout);
    let record = state
        .saga
        .checkout(req.member_id, req.item_id, deadline)
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// POST /returns: return a member's checked-out item.
#[tracing::instrument(skip(state))]
pub async fn return_item<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Json(req): Json<CirculationRequest>,
) -> Result<Json<CheckoutResponse>, ApiError>
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    let deadline = Deadline::after(state.request_timeout);
    let record = state
        .saga
        .return_item(req.member_id, req.item_id, deadline)
        .await?;

    Ok(Json(record.into()))
}

/// GET /checkouts/{id}: load one checkout.
#[tracing::instrument(skip(state))]
pub async fn get<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError>
where
    S: EventStore + Clone + 'static,
    R: CheckoutRecordStore + 'static,
{
    let checkout_id: AggregateId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid checkout id: {e}")))?;

    let record = state
        .saga
        .get_checkout(checkout_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Checkout {id} not found")))?;

    Ok(Json(record.into()))
}
