//! Customer enrichment for identified shoppers.
//!
//! Profiles are served from the store; unknown customers are fetched from
//! the (simulated) remote customer service and cached.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use posflow_engine::{
    decode_payload, CancellationToken, ConfigError, ConfigMap, Outcome, Plugin, PluginError,
    PluginState,
};
use posflow_events::{Event, EventKind};
use posflow_store::PosStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::support::{bool_or, guarded, validate, Accepts};

pub const NAME: &str = "customer_lookup";

const REMOTE_LOOKUP: &str = "remote_lookup";

#[derive(Debug, Deserialize)]
struct Identified {
    customer_id: String,
    #[serde(default)]
    basket_id: Option<String>,
    #[serde(default)]
    terminal_id: Option<String>,
    #[serde(default)]
    store_id: Option<String>,
}

pub struct CustomerLookup {
    state: PluginState,
    store: Arc<dyn PosStore>,
}

impl CustomerLookup {
    pub fn new(store: Arc<dyn PosStore>) -> Self {
        Self {
            state: PluginState::new(
                NAME,
                "Identifies customer events and enriches them with customer data",
            ),
            store,
        }
    }

    async fn identified(&self, event: &Event, cancel: &CancellationToken) -> Result<Vec<Event>, PluginError> {
        let who: Identified = decode_payload(event)?;

        let data = match guarded(cancel, self.store.customer(&who.customer_id)).await? {
            Some(data) => data,
            None if bool_or(&self.state.config(), REMOTE_LOOKUP, true) => {
                let data = remote_profile(&who.customer_id, event.timestamp());
                guarded(cancel, self.store.upsert_customer(&who.customer_id, &data)).await?;
                info!(customer_id = who.customer_id.as_str(), "Cached remote customer profile");
                data
            }
            None => {
                debug!(customer_id = who.customer_id.as_str(), "Unknown customer, remote lookup disabled");
                return Ok(Vec::new());
            }
        };

        guarded(cancel, self.store.touch_customer(&who.customer_id)).await?;

        Ok(vec![Event::at(
            EventKind::CustomerData,
            event.timestamp(),
            json!({
                "customer_id": who.customer_id,
                "basket_id": who.basket_id,
                "terminal_id": who.terminal_id,
                "store_id": who.store_id,
                "data": data,
            }),
        )])
    }
}

/// Stand-in for the remote customer service.
fn remote_profile(customer_id: &str, at: DateTime<Utc>) -> Value {
    let chars: Vec<char> = customer_id.chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(4)..].iter().collect();

    json!({
        "name": format!("Customer {suffix}"),
        "tier": "regular",
        "preferences": {
            "marketing_emails": true,
            "notifications": true,
        },
        "last_purchase": (at - Duration::hours(24)).to_rfc3339(),
        "total_purchases": 5,
        "average_basket": 45.99,
        "source": "remote_lookup",
        "fetched_at": at.to_rfc3339(),
    })
}

#[async_trait]
impl Plugin for CustomerLookup {
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
        validate(&config, &[(REMOTE_LOOKUP, Accepts::Bool)])?;
        self.state.replace_config(config);
        Ok(())
    }

    fn reacts_to(&self, kind: &EventKind) -> bool {
        *kind == EventKind::CustomerIdentify
    }

    async fn process(&self, event: &Event, cancel: &CancellationToken) -> Outcome {
        if !self.is_active() || *event.kind() != EventKind::CustomerIdentify {
            return Outcome::skip();
        }
        self.identified(event, cancel).await.into()
    }
}
