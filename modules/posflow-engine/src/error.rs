//! Typed errors for registration, plugin processing, and management.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin {0} already registered")]
    DuplicateName(String),
}

/// Errors a plugin reports from `process`. Contained to that plugin: counted
/// in its stats and aggregated into the dispatch result.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The event payload could not be read into the shape the plugin expects.
    #[error("cannot read {kind} payload: {reason}")]
    PayloadShape { kind: String, reason: String },

    /// External I/O the plugin depends on failed.
    #[error("dependency failed: {0}")]
    Dependency(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The dispatch was cancelled while the plugin was working.
    #[error("cancelled")]
    Cancelled,

    /// The plugin panicked inside `process`.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl PluginError {
    pub fn dependency(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        PluginError::Dependency(Box::new(err))
    }
}

/// A plugin rejected a configuration map. The previous config stays in place.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid config key {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub reason: String,
}

impl ConfigError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ManageError {
    #[error("plugin {0} not found")]
    NotFound(String),

    #[error("plugin {plugin} rejected configuration: {source}")]
    Configuration {
        plugin: String,
        #[source]
        source: ConfigError,
    },
}
