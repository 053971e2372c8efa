//! The plugin contract and shared plugin plumbing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use posflow_events::{Event, EventKind};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, PluginError};

/// Plugin configuration: an open JSON object, replaced wholesale.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// A pluggable event handler.
///
/// `process` is the only operation with domain logic. It is called
/// concurrently with other plugins and must not assume it only sees kinds it
/// reacts to: inactive plugins and irrelevant kinds return an empty outcome.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn is_active(&self) -> bool;

    /// Visible to the next `process` call.
    fn set_active(&self, active: bool);

    fn config(&self) -> ConfigMap;

    /// Replace the whole configuration. On error the previous config is kept.
    /// Never triggers processing.
    fn configure(&self, config: ConfigMap) -> Result<(), ConfigError>;

    /// Whether this plugin handles events of `kind`. The dispatcher skips
    /// plugins (and their stats) for kinds they do not react to.
    fn reacts_to(&self, kind: &EventKind) -> bool;

    /// Handle one event. May emit follow-on events and fail at the same time.
    async fn process(&self, event: &Event, cancel: &CancellationToken) -> Outcome;
}

/// Result of one `process` call.
#[derive(Debug, Default)]
pub struct Outcome {
    pub emitted: Vec<Event>,
    pub error: Option<PluginError>,
    /// The event was not handled at all (plugin inactive at call time, or
    /// the kind is not one it handles). No stats are recorded.
    skipped: bool,
}

impl Outcome {
    /// Nothing to do for this event. Use `emit(Vec::new())` for an event that
    /// was handled but produced no follow-ons.
    pub fn skip() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn emit(events: Vec<Event>) -> Self {
        Self {
            emitted: events,
            ..Self::default()
        }
    }

    pub fn failed(error: PluginError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Some events were produced before something went wrong.
    pub fn partial(events: Vec<Event>, error: PluginError) -> Self {
        Self {
            emitted: events,
            error: Some(error),
            skipped: false,
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }
}

impl From<Result<Vec<Event>, PluginError>> for Outcome {
    fn from(result: Result<Vec<Event>, PluginError>) -> Self {
        match result {
            Ok(events) => Outcome::emit(events),
            Err(e) => Outcome::failed(e),
        }
    }
}

/// Identity plus runtime state every plugin carries. Plugins embed one and
/// delegate the bookkeeping half of `Plugin` to it.
///
/// Plugins start inactive with an empty config.
pub struct PluginState {
    name: String,
    description: String,
    active: AtomicBool,
    config: RwLock<ConfigMap>,
}

impl PluginState {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            active: AtomicBool::new(false),
            config: RwLock::new(ConfigMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn config(&self) -> ConfigMap {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap in an already-validated config.
    pub fn replace_config(&self, config: ConfigMap) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }
}

/// Read an event payload into a typed shape.
pub fn decode_payload<T: DeserializeOwned>(event: &Event) -> Result<T, PluginError> {
    serde_json::from_value(event.payload().clone()).map_err(|e| PluginError::PayloadShape {
        kind: event.kind().to_string(),
        reason: e.to_string(),
    })
}
