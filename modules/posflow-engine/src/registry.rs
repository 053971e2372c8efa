//! Registry: plugins keyed by name, iterated in registration order.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::RegistryError;
use crate::plugin::Plugin;

#[derive(Default)]
struct Inner {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    order: Vec<String>,
}

/// Name-keyed plugin set.
///
/// One reader/writer lock guards both the map and the order list: `register`
/// is exclusive, reads are shared. The lock is never held while a plugin runs.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Fails without side effects if the name is taken.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if inner.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        inner.plugins.insert(name.clone(), plugin);
        inner.order.push(name.clone());
        drop(inner);

        info!(plugin = name.as_str(), "Registered plugin");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.plugins.get(name).cloned()
    }

    /// All plugins in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Plugin>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|name| inner.plugins.get(name).cloned())
            .collect()
    }

    /// Snapshot of the currently active plugins, in registration order.
    pub fn active(&self) -> Vec<Arc<dyn Plugin>> {
        self.list().into_iter().filter(|p| p.is_active()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
