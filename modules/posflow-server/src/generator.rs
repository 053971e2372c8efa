//! Synthetic point-of-sale traffic.
//!
//! A `Session` is one shopper at one till: login, basket, customer, a few
//! items, subtotal, payment, logout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use posflow_events::{Event, EventKind};
use posflow_transport::{EventSink, TransportError};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub const STORE_ID: &str = "STORE001";
pub const TERMINALS: &[&str] = &["POS001", "POS002", "POS003"];
pub const EMPLOYEES: &[&str] = &["EMP001", "EMP002", "EMP003"];
pub const CUSTOMERS: &[&str] = &["CUST001", "CUST002", "CUST003"];
pub const ITEMS: &[(&str, f64)] = &[
    ("ITEM001", 10.99),
    ("ITEM002", 15.99),
    ("ITEM003", 5.99),
    ("ITEM004", 20.99),
    ("ITEM005", 8.99),
];

/// Spacing between consecutive events of one session, in milliseconds.
const STEP_MS: i64 = 500;

#[derive(Debug, Clone)]
pub struct Session {
    pub terminal_id: String,
    pub employee_id: String,
    pub customer_id: String,
    pub basket_id: String,
    pub items: Vec<(String, f64)>,
}

impl Session {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let pick = |rng: &mut R, from: &[&str]| from.choose(rng).copied().unwrap_or_default().to_string();

        let terminal_id = pick(rng, TERMINALS);
        let employee_id = pick(rng, EMPLOYEES);
        let customer_id = pick(rng, CUSTOMERS);
        let count = rng.random_range(2..=4);
        let items = (0..count)
            .filter_map(|_| ITEMS.choose(rng))
            .map(|(id, price)| (id.to_string(), *price))
            .collect();

        Self {
            terminal_id,
            employee_id,
            customer_id,
            basket_id: Uuid::new_v4().to_string(),
            items,
        }
    }

    /// The session's events in order, timestamped from `start`.
    pub fn events(&self, start: DateTime<Utc>) -> Vec<Event> {
        let till = json!({
            "terminal_id": self.terminal_id,
            "store_id": STORE_ID,
            "employee_id": self.employee_id,
        });
        let basket = with(&till, json!({"basket_id": self.basket_id}));

        let mut steps = vec![
            (EventKind::EmployeeLogin, till.clone()),
            (EventKind::StartBasket, basket.clone()),
            (
                EventKind::CustomerIdentify,
                with(&basket, json!({"customer_id": self.customer_id})),
            ),
        ];
        for (item_id, price) in &self.items {
            steps.push((
                EventKind::AddItem,
                with(&basket, json!({"item_id": item_id, "price": price, "quantity": 1})),
            ));
        }
        steps.push((EventKind::FinalizeSubtotal, basket.clone()));
        steps.push((
            EventKind::PaymentComplete,
            with(&basket, json!({"payment_method": "CARD"})),
        ));
        steps.push((EventKind::EmployeeLogout, till));

        steps
            .into_iter()
            .enumerate()
            .map(|(i, (kind, payload))| Event::at(kind, start + chrono::Duration::milliseconds(STEP_MS * i as i64), payload))
            .collect()
    }
}

/// Merge two JSON objects; fields in `extra` win.
fn with(base: &Value, extra: Value) -> Value {
    let mut merged = base.clone();
    if let (Some(target), Value::Object(fields)) = (merged.as_object_mut(), extra) {
        target.extend(fields);
    }
    merged
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub sessions: u64,
    pub events_sent: u64,
    pub send_failures: u64,
}

/// Send random sessions through `sink`, pausing `interval` between sessions,
/// until `sessions` have been sent (if given) or `cancel` fires.
///
/// Individual send failures are logged and counted; a closed sink stops the
/// run with an error.
pub async fn run_generator(
    sink: &dyn EventSink,
    interval: Duration,
    sessions: Option<u64>,
    cancel: &CancellationToken,
) -> Result<GeneratorStats, TransportError> {
    let mut stats = GeneratorStats::default();

    while sessions.map_or(true, |limit| stats.sessions < limit) && !cancel.is_cancelled() {
        let session = Session::random(&mut rand::rng());
        info!(
            terminal_id = session.terminal_id.as_str(),
            employee_id = session.employee_id.as_str(),
            basket_id = session.basket_id.as_str(),
            items = session.items.len(),
            "Generating session"
        );

        for event in session.events(Utc::now()) {
            match sink.send(&event, cancel).await {
                Ok(()) => stats.events_sent += 1,
                Err(TransportError::Cancelled) => return Ok(stats),
                Err(TransportError::Closed) => return Err(TransportError::Closed),
                Err(e) => {
                    warn!(kind = %event.kind(), error = %e, "Failed to send event");
                    stats.send_failures += 1;
                }
            }
        }
        stats.sessions += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(stats)
}
