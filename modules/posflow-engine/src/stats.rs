//! Per-plugin processing counters.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStats {
    /// Every delivery to the plugin, failed or not.
    pub events_processed: u64,
    /// Timestamp of the last delivered event (event time, not wall clock).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<DateTime<Utc>>,
    pub error_count: u64,
}

/// Stats keyed by plugin name. Entries are created on first delivery and
/// never reset.
///
/// Has its own lock, separate from the registry: stats change on every
/// delivery, the registry rarely.
#[derive(Default)]
pub struct StatsTracker {
    inner: RwLock<HashMap<String, PluginStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivery of an event that occurred at `at`.
    pub fn record(&self, plugin: &str, at: DateTime<Utc>, failed: bool) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let stats = inner.entry(plugin.to_string()).or_default();
        stats.events_processed += 1;
        stats.last_processed = Some(at);
        if failed {
            stats.error_count += 1;
        }
    }

    pub fn get(&self, plugin: &str) -> Option<PluginStats> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(plugin)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, PluginStats> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
