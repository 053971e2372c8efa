//! Co-purchase recommendations for scanned items.

use std::sync::Arc;

use async_trait::async_trait;
use posflow_engine::{
    decode_payload, CancellationToken, ConfigError, ConfigMap, Outcome, Plugin, PluginError,
    PluginState,
};
use posflow_events::{Event, EventKind};
use posflow_store::{PosStore, StoreError, Write};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::support::{bool_or, guarded, u64_or, validate, Accepts};

pub const NAME: &str = "purchase_recommender";

const MAX_RECOMMENDATIONS: &str = "max_recommendations";
const RECORD_BASKET_ITEMS: &str = "record_basket_items";
const DEFAULT_MAX_RECOMMENDATIONS: u64 = 5;

#[derive(Debug, Deserialize)]
struct ItemAdded {
    basket_id: String,
    item_id: String,
    #[serde(default)]
    terminal_id: Option<String>,
    #[serde(default)]
    store_id: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    quantity: Option<i32>,
}

pub struct PurchaseRecommender {
    state: PluginState,
    store: Arc<dyn PosStore>,
}

impl PurchaseRecommender {
    pub fn new(store: Arc<dyn PosStore>) -> Self {
        Self {
            state: PluginState::new(
                NAME,
                "Analyzes basket items and provides purchase recommendations",
            ),
            store,
        }
    }

    /// Recompute the co-purchase table from recorded basket items. Runs
    /// outside dispatch, regardless of whether the plugin is active.
    pub async fn refresh(&self) -> Result<u64, StoreError> {
        let pairs = self.store.refresh_recommendations().await?;
        info!(pairs, "Refreshed purchase recommendations");
        Ok(pairs)
    }

    async fn item_added(&self, event: &Event, cancel: &CancellationToken) -> Result<Vec<Event>, PluginError> {
        let item: ItemAdded = decode_payload(event)?;
        let config = self.state.config();

        if bool_or(&config, RECORD_BASKET_ITEMS, true) {
            let write = Write::BasketItem {
                event_id: event.id().to_string(),
                basket_id: item.basket_id.clone(),
                item_id: item.item_id.clone(),
                price: item.price.unwrap_or_default(),
                quantity: item.quantity.unwrap_or(1),
                at: event.timestamp(),
            };
            guarded(cancel, self.store.apply(vec![write])).await?;
        }

        let limit = u64_or(&config, MAX_RECOMMENDATIONS, DEFAULT_MAX_RECOMMENDATIONS) as i64;
        let recommendations = guarded(cancel, self.store.recommendations(&item.item_id, limit)).await?;

        if recommendations.is_empty() {
            debug!(item_id = item.item_id.as_str(), "No recommendations for item");
            return Ok(Vec::new());
        }

        Ok(vec![Event::at(
            EventKind::PurchaseRecommendations,
            event.timestamp(),
            json!({
                "basket_id": item.basket_id,
                "terminal_id": item.terminal_id,
                "store_id": item.store_id,
                "source_item_id": item.item_id,
                "recommendations": recommendations,
            }),
        )])
    }
}

#[async_trait]
impl Plugin for PurchaseRecommender {
    fn name(&self) -> &str {
        self.state.name()
    }

    fn description(&self) -> &str {
        self.state.description()
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn set_active(&self, active: bool) {
        self.state.set_active(active)
    }

    fn config(&self) -> ConfigMap {
        self.state.config()
    }

    fn configure(&self, config: ConfigMap) -> Result<(), ConfigError> {
        validate(
            &config,
            &[
                (MAX_RECOMMENDATIONS, Accepts::Integer(1, 50)),
                (RECORD_BASKET_ITEMS, Accepts::Bool),
            ],
        )?;
        self.state.replace_config(config);
        Ok(())
    }

    fn reacts_to(&self, kind: &EventKind) -> bool {
        *kind == EventKind::AddItem
    }

    async fn process(&self, event: &Event, cancel: &CancellationToken) -> Outcome {
        if !self.is_active() || *event.kind() != EventKind::AddItem {
            return Outcome::skip();
        }
        self.item_added(event, cancel).await.into()
    }
}
