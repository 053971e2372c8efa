//! Management surface: list plugins, toggle them, replace their config.
//!
//! Everything here goes through the registry's shared lock or the plugin's
//! own state, so it is safe to call while dispatches are in flight.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::ManageError;
use crate::plugin::ConfigMap;
use crate::registry::Registry;
use crate::stats::{PluginStats, StatsTracker};

/// What the management API shows for one plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginView {
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub config: ConfigMap,
    pub stats: PluginStats,
}

#[derive(Clone)]
pub struct Manager {
    registry: Arc<Registry>,
    stats: Arc<StatsTracker>,
}

impl Manager {
    pub fn new(registry: Arc<Registry>, stats: Arc<StatsTracker>) -> Self {
        Self { registry, stats }
    }

    /// Every plugin in registration order. Plugins that never processed an
    /// event show zeroed stats.
    pub fn list(&self) -> Vec<PluginView> {
        self.registry
            .list()
            .into_iter()
            .map(|plugin| PluginView {
                name: plugin.name().to_string(),
                description: plugin.description().to_string(),
                is_active: plugin.is_active(),
                config: plugin.config(),
                stats: self.stats.get(plugin.name()).unwrap_or_default(),
            })
            .collect()
    }

    pub fn view(&self, name: &str) -> Result<PluginView, ManageError> {
        self.list()
            .into_iter()
            .find(|view| view.name == name)
            .ok_or_else(|| ManageError::NotFound(name.to_string()))
    }

    pub fn set_active(&self, name: &str, active: bool) -> Result<(), ManageError> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| ManageError::NotFound(name.to_string()))?;
        plugin.set_active(active);
        info!(plugin = name, active, "Plugin status changed");
        Ok(())
    }

    pub fn configure(&self, name: &str, config: ConfigMap) -> Result<(), ManageError> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| ManageError::NotFound(name.to_string()))?;
        plugin
            .configure(config)
            .map_err(|source| ManageError::Configuration {
                plugin: name.to_string(),
                source,
            })?;
        info!(plugin = name, "Plugin configuration replaced");
        Ok(())
    }

    /// Stats for one plugin; zeroed if it never processed anything.
    pub fn stats(&self, name: &str) -> Result<PluginStats, ManageError> {
        if self.registry.get(name).is_none() {
            return Err(ManageError::NotFound(name.to_string()));
        }
        Ok(self.stats.get(name).unwrap_or_default())
    }
}
