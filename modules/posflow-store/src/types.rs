use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A co-purchase suggestion for an item, joined with catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: String,
    pub name: String,
    pub price: f64,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: String,
    pub name: String,
    pub price: f64,
}

/// One statement in an atomic batch. See `PosStore::apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Mark the employee as logged in at `terminal_id`.
    EmployeeOnTerminal {
        employee_id: String,
        terminal_id: String,
        at: DateTime<Utc>,
    },
    /// Open a new time-tracking session.
    OpenSession {
        employee_id: String,
        terminal_id: String,
        at: DateTime<Utc>,
    },
    /// Clear the employee's current terminal if it is still `terminal_id`.
    /// A logout from a terminal the employee already left keeps the newer one.
    EmployeeOffTerminal {
        employee_id: String,
        terminal_id: String,
        at: DateTime<Utc>,
    },
    /// Close any open session for the employee at `terminal_id` and record
    /// its duration in minutes.
    CloseSession {
        employee_id: String,
        terminal_id: String,
        at: DateTime<Utc>,
    },
    /// Record an item scanned into a basket (feeds recommendation refresh).
    /// Keyed by the scan event's id: a redelivered scan is recorded once.
    BasketItem {
        event_id: String,
        basket_id: String,
        item_id: String,
        price: f64,
        quantity: i32,
        at: DateTime<Utc>,
    },
}

impl Write {
    pub fn label(&self) -> &'static str {
        match self {
            Write::EmployeeOnTerminal { .. } => "employee_on_terminal",
            Write::OpenSession { .. } => "open_session",
            Write::EmployeeOffTerminal { .. } => "employee_off_terminal",
            Write::CloseSession { .. } => "close_session",
            Write::BasketItem { .. } => "basket_item",
        }
    }
}
