//! HTTP surface: plugin management and event ingest.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use posflow_engine::{Manager, Plugin, Registry, StatsTracker};
use posflow_events::{wire, Event, EventKind};
use posflow_plugins::{CustomerLookup, EmployeeTracker};
use posflow_server::routes::{build_router, AppState};
use posflow_store::{MemoryStore, PosStore};
use posflow_transport::{channel, ChannelSource, MessageSource};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    router: Router,
    source: ChannelSource,
}

fn harness() -> Harness {
    let store: Arc<dyn PosStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new());
    registry
        .register(Arc::new(EmployeeTracker::new(store.clone())) as Arc<dyn Plugin>)
        .unwrap();
    registry
        .register(Arc::new(CustomerLookup::new(store)) as Arc<dyn Plugin>)
        .unwrap();

    let manager = Manager::new(registry, Arc::new(StatsTracker::new()));
    let (publisher, source) = channel(8);
    Harness {
        router: build_router(AppState { manager, publisher }),
        source,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness();
    let response = h
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn lists_plugins_in_registration_order() {
    let h = harness();
    let (status, body) = send(&h.router, Method::GET, "/api/plugins", None).await;

    assert_eq!(status, StatusCode::OK);
    let plugins = body.as_array().unwrap();
    assert_eq!(plugins.len(), 2);
    assert_eq!(plugins[0]["name"], "employee_time_tracker");
    assert_eq!(plugins[0]["isActive"], false);
    assert_eq!(plugins[0]["stats"]["eventsProcessed"], 0);
    assert_eq!(plugins[1]["name"], "customer_lookup");
}

#[tokio::test]
async fn toggles_plugin_status() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        "/api/plugins/employee_time_tracker/status",
        Some(json!({"isActive": true}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "employee_time_tracker");
    assert_eq!(body["isActive"], true);

    let (_, list) = send(&h.router, Method::GET, "/api/plugins", None).await;
    assert_eq!(list[0]["isActive"], true);
    assert_eq!(list[1]["isActive"], false);
}

#[tokio::test]
async fn unknown_plugin_is_not_found() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        "/api/plugins/nope/status",
        Some(json!({"isActive": true}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn malformed_status_body_is_bad_request() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        "/api/plugins/employee_time_tracker/status",
        Some("{\"isActive\": \"yes\"".to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn replaces_plugin_config() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        Method::PATCH,
        "/api/plugins/employee_time_tracker/config",
        Some(json!({"config": {"auto_logout": false}}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"], json!({"auto_logout": false}));
}

#[tokio::test]
async fn rejected_config_is_unprocessable_and_kept() {
    let h = harness();
    send(
        &h.router,
        Method::PATCH,
        "/api/plugins/employee_time_tracker/config",
        Some(json!({"config": {"auto_logout": false}}).to_string()),
    )
    .await;

    let (status, body) = send(
        &h.router,
        Method::PATCH,
        "/api/plugins/employee_time_tracker/config",
        Some(json!({"config": {"colour": "blue"}}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("colour"));

    let (_, list) = send(&h.router, Method::GET, "/api/plugins", None).await;
    assert_eq!(list[0]["config"], json!({"auto_logout": false}));
}

#[tokio::test]
async fn ingested_event_reaches_the_broker() {
    let mut h = harness();
    let event = Event::new(EventKind::StartBasket, json!({"basket_id": "B1"}));
    let raw = String::from_utf8(wire::encode(&event).unwrap()).unwrap();

    let (status, body) = send(&h.router, Method::POST, "/api/events", Some(raw)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["id"], event.id());

    let message = h.source.recv().await.unwrap();
    assert_eq!(message.offset, 0);
    assert_eq!(wire::decode(&message.payload).unwrap(), event);
}

#[tokio::test]
async fn anonymous_event_gets_an_id() {
    let mut h = harness();
    let raw = json!({
        "type": "ADD_ITEM",
        "timestamp": "2024-03-01T10:15:00Z",
        "payload": {"basket_id": "B1", "item_id": "ITEM001"}
    });

    let (status, body) = send(&h.router, Method::POST, "/api/events", Some(raw.to_string())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let message = h.source.recv().await.unwrap();
    assert_eq!(wire::decode(&message.payload).unwrap().id(), id);
}

#[tokio::test]
async fn invalid_event_is_bad_request() {
    let h = harness();
    let (status, _) = send(
        &h.router,
        Method::POST,
        "/api/events",
        Some(json!({"type": "", "timestamp": "2024-03-01T10:15:00Z"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, Method::POST, "/api/events", Some("not json".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn closed_broker_is_unavailable() {
    let Harness { router, mut source } = harness();
    source.close();

    let event = Event::new(EventKind::StartBasket, json!({}));
    let raw = String::from_utf8(wire::encode(&event).unwrap()).unwrap();
    let (status, body) = send(&router, Method::POST, "/api/events", Some(raw)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}
