//! In-memory `PosStore` for tests. No database required. Thread-safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::traits::PosStore;
use crate::types::{CatalogItem, Recommendation, Write};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmployeeRow {
    pub current_terminal_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub employee_id: String,
    pub terminal_id: String,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub data: serde_json::Value,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasketItemRow {
    pub event_id: String,
    pub basket_id: String,
    pub item_id: String,
    pub price: f64,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    employees: HashMap<String, EmployeeRow>,
    sessions: Vec<SessionRow>,
    customers: HashMap<String, CustomerRow>,
    items: HashMap<String, CatalogItem>,
    basket_items: Vec<BasketItemRow>,
    /// source item -> (recommended item -> confidence)
    recommendations: HashMap<String, HashMap<String, f64>>,
}

impl Tables {
    fn apply(&mut self, write: &Write) {
        match write {
            Write::EmployeeOnTerminal {
                employee_id,
                terminal_id,
                at,
            } => {
                let row = self.employees.entry(employee_id.clone()).or_default();
                row.current_terminal_id = Some(terminal_id.clone());
                row.last_login = Some(*at);
            }
            Write::OpenSession {
                employee_id,
                terminal_id,
                at,
            } => self.sessions.push(SessionRow {
                employee_id: employee_id.clone(),
                terminal_id: terminal_id.clone(),
                login_time: *at,
                logout_time: None,
                duration_minutes: None,
            }),
            Write::EmployeeOffTerminal {
                employee_id,
                terminal_id,
                at,
            } => {
                if let Some(row) = self.employees.get_mut(employee_id) {
                    if row.current_terminal_id.as_ref() == Some(terminal_id) {
                        row.current_terminal_id = None;
                    }
                    row.last_logout = Some(*at);
                }
            }
            Write::CloseSession {
                employee_id,
                terminal_id,
                at,
            } => {
                for session in self.sessions.iter_mut().filter(|s| {
                    &s.employee_id == employee_id
                        && &s.terminal_id == terminal_id
                        && s.logout_time.is_none()
                }) {
                    session.logout_time = Some(*at);
                    session.duration_minutes =
                        Some((*at - session.login_time).num_milliseconds() as f64 / 60_000.0);
                }
            }
            Write::BasketItem {
                event_id,
                basket_id,
                item_id,
                price,
                quantity,
                at,
            } => {
                if self.basket_items.iter().any(|row| &row.event_id == event_id) {
                    return;
                }
                self.basket_items.push(BasketItemRow {
                    event_id: event_id.clone(),
                    basket_id: basket_id.clone(),
                    item_id: item_id.clone(),
                    price: *price,
                    quantity: *quantity,
                    added_at: *at,
                });
            }
        }
    }
}

/// In-memory store with the same semantics as `PgStore`.
///
/// `fail_next(n)` makes the next `n` store calls fail with
/// `StoreError::Injected`; `with_latency` delays every call, which lets tests
/// exercise cancellation of in-flight I/O.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_item(self, item_id: &str, name: &str, price: f64) -> Self {
        self.tables.lock().unwrap().items.insert(
            item_id.to_string(),
            CatalogItem {
                item_id: item_id.to_string(),
                name: name.to_string(),
                price,
            },
        );
        self
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of store calls made so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_recommendation(&self, source: &str, recommended: &str, confidence: f64) {
        self.tables
            .lock()
            .unwrap()
            .recommendations
            .entry(source.to_string())
            .or_default()
            .insert(recommended.to_string(), confidence);
    }

    pub fn employee(&self, employee_id: &str) -> Option<EmployeeRow> {
        self.tables.lock().unwrap().employees.get(employee_id).cloned()
    }

    pub fn sessions(&self) -> Vec<SessionRow> {
        self.tables.lock().unwrap().sessions.clone()
    }

    pub fn customer_row(&self, customer_id: &str) -> Option<CustomerRow> {
        self.tables.lock().unwrap().customers.get(customer_id).cloned()
    }

    pub fn basket_items(&self) -> Vec<BasketItemRow> {
        self.tables.lock().unwrap().basket_items.clone()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Injected);
        }
        Ok(())
    }
}

#[async_trait]
impl PosStore for MemoryStore {
    async fn current_terminal(&self, employee_id: &str) -> Result<Option<String>, StoreError> {
        self.enter().await?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .employees
            .get(employee_id)
            .and_then(|row| row.current_terminal_id.clone()))
    }

    async fn customer(&self, customer_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.enter().await?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .customers
            .get(customer_id)
            .map(|row| row.data.clone()))
    }

    async fn upsert_customer(
        &self,
        customer_id: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.enter().await?;
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        tables
            .customers
            .entry(customer_id.to_string())
            .and_modify(|row| row.data = data.clone())
            .or_insert_with(|| CustomerRow {
                data: data.clone(),
                last_seen: now,
            });
        Ok(())
    }

    async fn touch_customer(&self, customer_id: &str) -> Result<(), StoreError> {
        self.enter().await?;
        if let Some(row) = self.tables.lock().unwrap().customers.get_mut(customer_id) {
            row.last_seen = Utc::now();
        }
        Ok(())
    }

    async fn recommendations(
        &self,
        item_id: &str,
        limit: i64,
    ) -> Result<Vec<Recommendation>, StoreError> {
        self.enter().await?;
        let tables = self.tables.lock().unwrap();
        let Some(targets) = tables.recommendations.get(item_id) else {
            return Ok(Vec::new());
        };

        let mut recs: Vec<Recommendation> = targets
            .iter()
            .filter_map(|(target, confidence)| {
                let item = tables.items.get(target)?;
                Some(Recommendation {
                    item_id: item.item_id.clone(),
                    name: item.name.clone(),
                    price: item.price,
                    confidence_score: *confidence,
                })
            })
            .collect();
        recs.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
        recs.truncate(limit.max(0) as usize);
        Ok(recs)
    }

    async fn refresh_recommendations(&self) -> Result<u64, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.lock().unwrap();

        let updates: Vec<(String, String, f64)> = {
            let mut by_basket: HashMap<&str, Vec<&str>> = HashMap::new();
            let mut item_counts: HashMap<&str, u64> = HashMap::new();
            for row in &tables.basket_items {
                by_basket
                    .entry(row.basket_id.as_str())
                    .or_default()
                    .push(row.item_id.as_str());
                *item_counts.entry(row.item_id.as_str()).or_default() += 1;
            }

            // Same pairing as the SQL self-join: every ordered (a < b) row
            // pair within one basket.
            let mut pair_counts: HashMap<(&str, &str), u64> = HashMap::new();
            for items in by_basket.values() {
                for a in items {
                    for b in items {
                        if a < b {
                            *pair_counts.entry((*a, *b)).or_default() += 1;
                        }
                    }
                }
            }

            pair_counts
                .into_iter()
                .filter(|(_, count)| *count >= 2)
                .map(|((a, b), count)| {
                    let confidence = count as f64 / item_counts[a] as f64;
                    (a.to_string(), b.to_string(), confidence)
                })
                .filter(|(_, _, confidence)| *confidence >= 0.1)
                .collect()
        };

        let written = updates.len() as u64;
        for (source, target, confidence) in updates {
            tables
                .recommendations
                .entry(source)
                .or_default()
                .insert(target, confidence);
        }
        Ok(written)
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        self.enter().await?;
        let mut tables = self.tables.lock().unwrap();
        // Stage on a copy so a batch lands whole.
        let mut staged = tables.clone();
        for write in &writes {
            staged.apply(write);
        }
        *tables = staged;
        Ok(())
    }
}
