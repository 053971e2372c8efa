use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Recommendation, Write};

/// Store operations available to handlers.
///
/// Implemented by `PgStore` (postgres) and `MemoryStore` (tests).
/// Also implemented for `Arc<S>` so one store can be shared across handlers.
#[async_trait]
pub trait PosStore: Send + Sync {
    /// Terminal the employee is currently logged in at, if any.
    async fn current_terminal(&self, employee_id: &str) -> Result<Option<String>, StoreError>;

    /// Cached customer profile.
    async fn customer(&self, customer_id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn upsert_customer(
        &self,
        customer_id: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Bump the customer's `last_seen` to now. No-op for unknown customers.
    async fn touch_customer(&self, customer_id: &str) -> Result<(), StoreError>;

    /// Best recommendations for an item, highest confidence first.
    async fn recommendations(
        &self,
        item_id: &str,
        limit: i64,
    ) -> Result<Vec<Recommendation>, StoreError>;

    /// Recompute co-purchase recommendations from recorded basket items.
    /// Returns the number of pairs written.
    async fn refresh_recommendations(&self) -> Result<u64, StoreError>;

    /// Apply all writes atomically: either every write lands or none does.
    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: PosStore + ?Sized> PosStore for Arc<S> {
    async fn current_terminal(&self, employee_id: &str) -> Result<Option<String>, StoreError> {
        (**self).current_terminal(employee_id).await
    }

    async fn customer(&self, customer_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        (**self).customer(customer_id).await
    }

    async fn upsert_customer(
        &self,
        customer_id: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        (**self).upsert_customer(customer_id, data).await
    }

    async fn touch_customer(&self, customer_id: &str) -> Result<(), StoreError> {
        (**self).touch_customer(customer_id).await
    }

    async fn recommendations(
        &self,
        item_id: &str,
        limit: i64,
    ) -> Result<Vec<Recommendation>, StoreError> {
        (**self).recommendations(item_id, limit).await
    }

    async fn refresh_recommendations(&self) -> Result<u64, StoreError> {
        (**self).refresh_recommendations().await
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        (**self).apply(writes).await
    }
}
