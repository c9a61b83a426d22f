//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AggregateId, MemberId};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::InMemoryReadModels;
use saga::{InMemoryMembership, InventoryCapability, LocalInventory};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn circulation_request(uri: &str, member_id: MemberId, item_id: AggregateId) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "member_id": member_id, "item_id": item_id }).to_string(),
        ))
        .unwrap()
}

struct TestApp {
    app: axum::Router,
    inventory: Arc<LocalInventory<InMemoryEventStore, InMemoryReadModels>>,
    membership: InMemoryMembership,
}

impl TestApp {
    fn new() -> Self {
        let config = api::Config::default();
        let store = InMemoryEventStore::new();
        let read_models = InMemoryReadModels::new();
        let inventory = Arc::new(LocalInventory::new(store.clone(), read_models.clone()));
        let membership = InMemoryMembership::new();

        let state = api::create_state(
            &config,
            store,
            read_models,
            inventory.clone(),
            Arc::new(membership.clone()),
        );
        let app = api::create_app(state, get_metrics_handle());

        Self {
            app,
            inventory,
            membership,
        }
    }

    async fn add_item(&self, copies: u32) -> AggregateId {
        self.inventory
            .catalog()
            .add("978-0765", "Mistborn", "Sanderson", copies)
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        send(&self.app, request).await
    }

    async fn post(&self, uri: &str, member_id: MemberId, item_id: AggregateId) -> (StatusCode, serde_json::Value) {
        self.send(circulation_request(uri, member_id, item_id)).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();
    let (status, json) = t.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_checkout_get_and_return() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;
    let member_id = t.membership.register_active().await;

    let (status, created) = t.post("/checkouts", member_id, item_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "active");
    assert_eq!(created["member_id"], member_id.to_string());
    let checkout_id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = t.get(&format!("/checkouts/{checkout_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["due_date"], created["due_date"]);

    let (status, returned) = t.post("/returns", member_id, item_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["id"], checkout_id.as_str());
    assert_eq!(returned["status"], "returned");
    assert!(returned["return_date"].is_string());

    assert_eq!(t.inventory.get_item(item_id).await.unwrap().available, 1);
}

#[tokio::test]
async fn test_no_copies_is_unprocessable() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;
    let first = t.membership.register_active().await;
    let second = t.membership.register_active().await;

    let (status, _) = t.post("/checkouts", first, item_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = t.post("/checkouts", second, item_id).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "validation_failed");
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;

    let (status, json) = t.post("/checkouts", MemberId::new(), item_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn test_return_without_checkout_is_not_found() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;
    let member_id = t.membership.register_active().await;

    let (status, _) = t.post("/returns", member_id, item_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_membership_outage_is_service_unavailable() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;
    let member_id = t.membership.register_active().await;
    t.membership.set_unavailable(true).await;

    let (status, json) = t.post("/checkouts", member_id, item_id).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "infrastructure_failure");
    assert_eq!(t.inventory.get_item(item_id).await.unwrap().available, 1);
}

#[tokio::test]
async fn test_get_checkout_errors() {
    let t = TestApp::new();

    let (status, _) = t.get("/checkouts/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.get(&format!("/checkouts/{}", AggregateId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let t = TestApp::new();
    let (status, _) = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/checkouts")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"member_id":"nope","item_id":"nope"}"#))
                .unwrap(),
        )
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    let item_id = t.add_item(1).await;
    let member_id = t.membership.register_active().await;
    t.post("/checkouts", member_id, item_id).await;

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_started_total"));
}

#[tokio::test]
async fn test_default_wiring_serves_seeded_members_and_items() {
    let member_id = MemberId::new();
    let item_id = AggregateId::new();
    let seed: api::Seed = serde_json::from_value(serde_json::json!({
        "members": [{ "id": member_id, "status": "active", "fine_balance": 0.0 }],
        "items": [{
            "id": item_id,
            "isbn": "978-0765",
            "title": "Mistborn",
            "author": "Sanderson",
            "total_copies": 1
        }]
    }))
    .unwrap();

    let config = api::Config::default();
    let store = InMemoryEventStore::new();
    let read_models = InMemoryReadModels::new();
    let (inventory, membership) =
        api::build_capabilities(&config, store.clone(), read_models.clone(), &seed)
            .await
            .unwrap();
    let state = api::create_state(&config, store.clone(), read_models.clone(), inventory, membership);
    let app = api::create_app(state, get_metrics_handle());

    let (status, created) = send(&app, circulation_request("/checkouts", member_id, item_id)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["item_id"], item_id.to_string());

    // A second boot against the same store does not add the item again.
    let (inventory, _) = api::build_capabilities(&config, store, read_models, &seed)
        .await
        .unwrap();
    let item = inventory.get_item(item_id).await.unwrap();
    assert_eq!((item.total_copies, item.available), (1, 0));
}

#[tokio::test]
async fn test_default_wiring_without_seed_rejects_every_member() {
    let config = api::Config::default();
    let store = InMemoryEventStore::new();
    let read_models = InMemoryReadModels::new();
    let (inventory, membership) =
        api::build_capabilities(&config, store.clone(), read_models.clone(), &api::Seed::default())
            .await
            .unwrap();
    let state = api::create_state(&config, store, read_models, inventory, membership);
    let app = api::create_app(state, get_metrics_handle());

    let (status, json) =
        send(&app, circulation_request("/checkouts", MemberId::new(), AggregateId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}
