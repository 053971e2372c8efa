//! Event dispatch engine.
//!
//! Routes an event to every active plugin that reacts to its kind, runs them
//! concurrently, records per-plugin stats, and recursively dispatches any
//! events the plugins emit until the call tree settles.
//!
//! Consumers implement `Plugin` and register instances in a `Registry`. The
//! `Dispatcher` does the routing; the `Manager` is the administrative view
//! (list, toggle, reconfigure).

pub mod dispatcher;
pub mod error;
pub mod manage;
pub mod plugin;
pub mod registry;
pub mod stats;

pub use dispatcher::{
    DispatchError, DispatchReport, Dispatcher, DispatcherConfig, FailureKind, HandlerFailure,
};
pub use error::{ConfigError, ManageError, PluginError, RegistryError};
pub use manage::{Manager, PluginView};
pub use plugin::{decode_payload, ConfigMap, Outcome, Plugin, PluginState};
pub use registry::Registry;
pub use stats::{PluginStats, StatsTracker};

pub use tokio_util::sync::CancellationToken;
