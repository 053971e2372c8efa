//! Plugin behavior against the in-memory store, alone and through dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as Span, TimeZone, Utc};
use posflow_engine::{
    CancellationToken, ConfigMap, Dispatcher, FailureKind, Plugin, PluginError, Registry,
    StatsTracker,
};
use posflow_events::{Event, EventKind};
use posflow_plugins::{CustomerLookup, EmployeeTracker, PurchaseRecommender};
use posflow_store::{MemoryStore, PosStore};
use serde_json::{json, Value};

fn catalog() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_item("ITEM001", "Coffee", 10.99)
            .with_item("ITEM002", "Milk", 15.99)
            .with_item("ITEM003", "Bread", 5.99)
            .with_item("ITEM004", "Cheese", 20.99),
    )
}

fn active<P: Plugin + 'static>(plugin: P) -> Arc<P> {
    plugin.set_active(true);
    Arc::new(plugin)
}

fn config(value: Value) -> ConfigMap {
    value.as_object().cloned().unwrap()
}

fn dispatcher_with(plugins: Vec<Arc<dyn Plugin>>) -> Dispatcher {
    let registry = Arc::new(Registry::new());
    for plugin in plugins {
        registry.register(plugin).unwrap();
    }
    Dispatcher::new(registry, Arc::new(StatsTracker::new()))
}

// ---------------------------------------------------------------------------
// employee_tracker
// ---------------------------------------------------------------------------

fn login(employee: &str, terminal: &str, at: chrono::DateTime<Utc>) -> Event {
    Event::at(
        EventKind::EmployeeLogin,
        at,
        json!({"employee_id": employee, "terminal_id": terminal, "store_id": "STORE001"}),
    )
}

fn logout(employee: &str, terminal: &str, at: chrono::DateTime<Utc>) -> Event {
    Event::at(
        EventKind::EmployeeLogout,
        at,
        json!({"employee_id": employee, "terminal_id": terminal}),
    )
}

#[test]
fn tracker_is_addressed_as_employee_time_tracker() {
    let tracker = EmployeeTracker::new(catalog());
    assert_eq!(tracker.name(), "employee_time_tracker");
    assert_eq!(
        tracker.description(),
        "Tracks employee login/logout events and calculates time spent at terminals"
    );
}

#[tokio::test]
async fn login_then_logout_records_a_session() {
    let store = catalog();
    let tracker = active(EmployeeTracker::new(store.clone()));
    let cancel = CancellationToken::new();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let outcome = tracker.process(&login("EMP001", "POS001", start), &cancel).await;
    assert!(outcome.error.is_none());
    assert!(outcome.emitted.is_empty());
    assert_eq!(
        store.current_terminal("EMP001").await.unwrap().as_deref(),
        Some("POS001")
    );

    let outcome = tracker
        .process(&logout("EMP001", "POS001", start + Span::minutes(45)), &cancel)
        .await;
    assert!(outcome.error.is_none());

    assert!(store.current_terminal("EMP001").await.unwrap().is_none());
    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration_minutes, Some(45.0));
}

#[tokio::test]
async fn login_elsewhere_emits_auto_logout_for_old_terminal() {
    let store = catalog();
    let tracker = active(EmployeeTracker::new(store.clone()));
    let cancel = CancellationToken::new();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let moved = start + Span::minutes(30);

    tracker.process(&login("EMP001", "POS001", start), &cancel).await;
    let outcome = tracker.process(&login("EMP001", "POS002", moved), &cancel).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.emitted.len(), 1);
    let auto = &outcome.emitted[0];
    assert_eq!(*auto.kind(), EventKind::EmployeeLogout);
    assert_eq!(auto.timestamp(), moved);
    assert_eq!(
        auto.payload(),
        &json!({
            "employee_id": "EMP001",
            "terminal_id": "POS001",
            "store_id": "STORE001",
            "auto_logout": true,
            "reason": "Login detected at different terminal",
        })
    );
}

#[tokio::test]
async fn auto_logout_flows_back_through_dispatch() {
    let store = catalog();
    let tracker: Arc<dyn Plugin> = active(EmployeeTracker::new(store.clone()));
    let dispatcher = dispatcher_with(vec![tracker]);
    let cancel = CancellationToken::new();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    dispatcher
        .dispatch(login("EMP001", "POS001", start), &cancel)
        .await
        .unwrap();
    let report = dispatcher
        .dispatch(login("EMP001", "POS002", start + Span::minutes(20)), &cancel)
        .await
        .unwrap();

    assert_eq!(report.events_dispatched, 2);
    assert_eq!(
        store.current_terminal("EMP001").await.unwrap().as_deref(),
        Some("POS002")
    );

    let sessions = store.sessions();
    let old = sessions.iter().find(|s| s.terminal_id == "POS001").unwrap();
    let new = sessions.iter().find(|s| s.terminal_id == "POS002").unwrap();
    assert_eq!(old.duration_minutes, Some(20.0));
    assert!(new.logout_time.is_none());

    let stats = dispatcher.stats().get("employee_time_tracker").unwrap();
    assert_eq!(stats.events_processed, 3);
    assert_eq!(stats.error_count, 0);
}

#[tokio::test]
async fn auto_logout_can_be_disabled() {
    let store = catalog();
    let tracker = active(EmployeeTracker::new(store.clone()));
    tracker.configure(config(json!({"auto_logout": false}))).unwrap();
    let cancel = CancellationToken::new();
    let start = Utc::now();

    tracker.process(&login("EMP001", "POS001", start), &cancel).await;
    let outcome = tracker.process(&login("EMP001", "POS002", start), &cancel).await;

    assert!(outcome.emitted.is_empty());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn login_without_employee_id_is_a_payload_error() {
    let store = catalog();
    let tracker = active(EmployeeTracker::new(store.clone()));
    let event = Event::new(EventKind::EmployeeLogin, json!({"terminal_id": "POS001"}));

    let outcome = tracker.process(&event, &CancellationToken::new()).await;

    assert!(matches!(outcome.error, Some(PluginError::PayloadShape { .. })));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn store_failure_is_a_dependency_error_and_counted() {
    let store = catalog();
    let tracker: Arc<dyn Plugin> = active(EmployeeTracker::new(store.clone()));
    let dispatcher = dispatcher_with(vec![tracker]);
    store.fail_next(1);

    let err = dispatcher
        .dispatch(login("EMP001", "POS001", Utc::now()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_plugins(), vec!["employee_time_tracker"]);
    assert!(matches!(
        err.failures[0].kind,
        FailureKind::Plugin(PluginError::Dependency(_))
    ));
    assert_eq!(dispatcher.stats().get("employee_time_tracker").unwrap().error_count, 1);
    assert!(store.sessions().is_empty());
}

#[tokio::test]
async fn inactive_tracker_does_nothing() {
    let store = catalog();
    let tracker = EmployeeTracker::new(store.clone());

    let outcome = tracker
        .process(&login("EMP001", "POS001", Utc::now()), &CancellationToken::new())
        .await;

    assert!(outcome.emitted.is_empty() && outcome.error.is_none());
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_store_io() {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_secs(30)));
    let tracker = active(EmployeeTracker::new(store));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        tracker.process(&login("EMP001", "POS001", Utc::now()), &cancel),
    )
    .await
    .expect("process should stop on cancellation");

    assert!(matches!(outcome.error, Some(PluginError::Cancelled)));
}

// ---------------------------------------------------------------------------
// purchase_recommender
// ---------------------------------------------------------------------------

fn add_item(basket: &str, item: &str) -> Event {
    Event::new(
        EventKind::AddItem,
        json!({
            "basket_id": basket,
            "item_id": item,
            "terminal_id": "POS001",
            "store_id": "STORE001",
            "price": 10.99,
        }),
    )
}

#[tokio::test]
async fn recommends_top_items_for_scanned_item() {
    let store = catalog();
    store.set_recommendation("ITEM001", "ITEM002", 0.4);
    store.set_recommendation("ITEM001", "ITEM003", 0.9);
    let recommender = active(PurchaseRecommender::new(store.clone()));
    let event = add_item("B1", "ITEM001");

    let outcome = recommender.process(&event, &CancellationToken::new()).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.emitted.len(), 1);
    let emitted = &outcome.emitted[0];
    assert_eq!(*emitted.kind(), EventKind::PurchaseRecommendations);
    assert_eq!(emitted.timestamp(), event.timestamp());

    let payload = emitted.payload();
    assert_eq!(payload["basket_id"], "B1");
    assert_eq!(payload["source_item_id"], "ITEM001");
    assert_eq!(payload["terminal_id"], "POS001");
    let recs = payload["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0]["item_id"], "ITEM003");
    assert_eq!(recs[0]["name"], "Bread");
    assert_eq!(recs[0]["confidence_score"], 0.9);

    let recorded = store.basket_items();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].basket_id, "B1");
    assert_eq!(recorded[0].quantity, 1);
}

#[tokio::test]
async fn no_recommendations_emits_nothing() {
    let store = catalog();
    let recommender = active(PurchaseRecommender::new(store));

    let outcome = recommender
        .process(&add_item("B1", "ITEM004"), &CancellationToken::new())
        .await;

    assert!(outcome.emitted.is_empty());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn max_recommendations_limits_the_list() {
    let store = catalog();
    store.set_recommendation("ITEM001", "ITEM002", 0.4);
    store.set_recommendation("ITEM001", "ITEM003", 0.9);
    let recommender = active(PurchaseRecommender::new(store.clone()));
    recommender
        .configure(config(json!({"max_recommendations": 1, "record_basket_items": false})))
        .unwrap();

    let outcome = recommender
        .process(&add_item("B1", "ITEM001"), &CancellationToken::new())
        .await;

    let recs = outcome.emitted[0].payload()["recommendations"].as_array().unwrap().clone();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["item_id"], "ITEM003");
    assert!(store.basket_items().is_empty());
}

#[tokio::test]
async fn recommender_rejects_bad_config_and_keeps_old() {
    let recommender = PurchaseRecommender::new(catalog());
    recommender
        .configure(config(json!({"max_recommendations": 3})))
        .unwrap();

    let err = recommender
        .configure(config(json!({"max_recommendations": 0})))
        .unwrap_err();
    assert_eq!(err.key, "max_recommendations");

    let err = recommender.configure(config(json!({"threshold": 0.5}))).unwrap_err();
    assert_eq!(err.key, "threshold");

    assert_eq!(recommender.config(), config(json!({"max_recommendations": 3})));
}

#[tokio::test]
async fn refresh_learns_from_recorded_baskets() {
    let store = catalog();
    let recommender = active(PurchaseRecommender::new(store.clone()));
    let cancel = CancellationToken::new();

    for basket in ["B1", "B2"] {
        recommender.process(&add_item(basket, "ITEM001"), &cancel).await;
        recommender.process(&add_item(basket, "ITEM002"), &cancel).await;
    }

    let pairs = recommender.refresh().await.unwrap();
    assert_eq!(pairs, 1);

    let outcome = recommender.process(&add_item("B3", "ITEM001"), &cancel).await;
    let recs = outcome.emitted[0].payload()["recommendations"].as_array().unwrap().clone();
    assert_eq!(recs[0]["item_id"], "ITEM002");
}

#[tokio::test]
async fn redelivered_scans_are_recorded_once() {
    let store = catalog();
    let recommender: Arc<dyn Plugin> = active(PurchaseRecommender::new(store.clone()));
    let dispatcher = dispatcher_with(vec![recommender]);
    let cancel = CancellationToken::new();

    let scans = [add_item("B1", "ITEM001"), add_item("B1", "ITEM002")];
    for _ in 0..2 {
        for scan in &scans {
            dispatcher.dispatch(scan.clone(), &cancel).await.unwrap();
        }
    }

    assert_eq!(store.basket_items().len(), 2);

    // one real basket is below the co-purchase threshold
    assert_eq!(store.refresh_recommendations().await.unwrap(), 0);
    assert!(store.recommendations("ITEM001", 5).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// customer_lookup
// ---------------------------------------------------------------------------

fn identify(customer: &str) -> Event {
    Event::new(
        EventKind::CustomerIdentify,
        json!({
            "customer_id": customer,
            "basket_id": "B1",
            "terminal_id": "POS001",
            "store_id": "STORE001",
        }),
    )
}

#[tokio::test]
async fn unknown_customer_is_fetched_remotely_and_cached() {
    let store = catalog();
    let lookup = active(CustomerLookup::new(store.clone()));

    let outcome = lookup
        .process(&identify("CUST001"), &CancellationToken::new())
        .await;

    assert!(outcome.error.is_none());
    let emitted = &outcome.emitted[0];
    assert_eq!(*emitted.kind(), EventKind::CustomerData);
    let payload = emitted.payload();
    assert_eq!(payload["customer_id"], "CUST001");
    assert_eq!(payload["basket_id"], "B1");
    assert_eq!(payload["data"]["name"], "Customer T001");
    assert_eq!(payload["data"]["tier"], "regular");
    assert_eq!(payload["data"]["source"], "remote_lookup");

    let cached = store.customer_row("CUST001").unwrap();
    assert_eq!(cached.data, payload["data"]);
}

#[tokio::test]
async fn known_customer_is_served_from_store() {
    let store = catalog();
    store
        .upsert_customer("CUST002", &json!({"name": "Ada", "tier": "gold"}))
        .await
        .unwrap();
    let lookup = active(CustomerLookup::new(store.clone()));

    let outcome = lookup
        .process(&identify("CUST002"), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome.emitted[0].payload()["data"],
        json!({"name": "Ada", "tier": "gold"})
    );
}

#[tokio::test]
async fn remote_lookup_disabled_skips_unknown_customers() {
    let store = catalog();
    let lookup = active(CustomerLookup::new(store.clone()));
    lookup.configure(config(json!({"remote_lookup": false}))).unwrap();

    let outcome = lookup
        .process(&identify("CUST003"), &CancellationToken::new())
        .await;

    assert!(outcome.emitted.is_empty());
    assert!(outcome.error.is_none());
    assert!(store.customer_row("CUST003").is_none());
}

#[tokio::test]
async fn sibling_plugins_run_for_their_own_kinds() {
    let store = catalog();
    store.set_recommendation("ITEM001", "ITEM002", 0.5);
    let dispatcher = dispatcher_with(vec![
        active(EmployeeTracker::new(store.clone())) as Arc<dyn Plugin>,
        active(PurchaseRecommender::new(store.clone())),
        active(CustomerLookup::new(store.clone())),
    ]);
    let cancel = CancellationToken::new();

    let report = dispatcher.dispatch(add_item("B1", "ITEM001"), &cancel).await.unwrap();
    assert_eq!(report.events_dispatched, 2);
    assert_eq!(report.handler_calls, 1);

    let report = dispatcher.dispatch(identify("CUST001"), &cancel).await.unwrap();
    assert_eq!(report.events_dispatched, 2);

    let stats = dispatcher.stats();
    assert!(stats.get("employee_time_tracker").is_none());
    assert_eq!(stats.get("purchase_recommender").unwrap().events_processed, 1);
    assert_eq!(stats.get("customer_lookup").unwrap().events_processed, 1);
}

#[tokio::test]
async fn basket_write_failure_does_not_emit() {
    let store = catalog();
    store.set_recommendation("ITEM001", "ITEM002", 0.5);
    let recommender = active(PurchaseRecommender::new(store.clone()));
    store.fail_next(1);

    let outcome = recommender
        .process(&add_item("B1", "ITEM001"), &CancellationToken::new())
        .await;

    assert!(matches!(outcome.error, Some(PluginError::Dependency(_))));
    assert!(outcome.emitted.is_empty());
    // apply failed before the lookup ran
    assert_eq!(store.calls(), 1);
}
