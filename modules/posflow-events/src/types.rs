//! Core event types. Immutable once built.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic type of an event.
///
/// Terminal-originated kinds are listed explicitly. Handlers may introduce new
/// kinds at any time; those round-trip through `Other` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    EmployeeLogin,
    EmployeeLogout,
    StartBasket,
    CustomerIdentify,
    AddItem,
    FinalizeSubtotal,
    PaymentComplete,
    CustomerData,
    PurchaseRecommendations,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::EmployeeLogin => "EMPLOYEE_LOGIN",
            EventKind::EmployeeLogout => "EMPLOYEE_LOGOUT",
            EventKind::StartBasket => "START_BASKET",
            EventKind::CustomerIdentify => "CUSTOMER_IDENTIFY",
            EventKind::AddItem => "ADD_ITEM",
            EventKind::FinalizeSubtotal => "FINALIZE_SUBTOTAL",
            EventKind::PaymentComplete => "PAYMENT_COMPLETE",
            EventKind::CustomerData => "CUSTOMER_DATA",
            EventKind::PurchaseRecommendations => "PURCHASE_RECOMMENDATIONS",
            EventKind::Other(s) => s,
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "EMPLOYEE_LOGIN" => EventKind::EmployeeLogin,
            "EMPLOYEE_LOGOUT" => EventKind::EmployeeLogout,
            "START_BASKET" => EventKind::StartBasket,
            "CUSTOMER_IDENTIFY" => EventKind::CustomerIdentify,
            "ADD_ITEM" => EventKind::AddItem,
            "FINALIZE_SUBTOTAL" => EventKind::FinalizeSubtotal,
            "PAYMENT_COMPLETE" => EventKind::PaymentComplete,
            "CUSTOMER_DATA" => EventKind::CustomerData,
            "PURCHASE_RECOMMENDATIONS" => EventKind::PurchaseRecommendations,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match EventKind::from(s.as_str()) {
            EventKind::Other(_) => EventKind::Other(s),
            known => known,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-of-sale event. Fields are private; build a new event instead of
/// changing an existing one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: EventKind,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
}

impl Event {
    /// New event happening now, with a fresh id.
    pub fn new(kind: impl Into<EventKind>, payload: serde_json::Value) -> Self {
        Self::at(kind, Utc::now(), payload)
    }

    /// New event with an explicit occurrence time, with a fresh id.
    pub fn at(
        kind: impl Into<EventKind>,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            timestamp,
            payload,
        }
    }

    pub(crate) fn from_parts(
        id: String,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            kind,
            timestamp,
            payload,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}
