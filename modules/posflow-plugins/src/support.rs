use std::future::Future;

use posflow_engine::{CancellationToken, ConfigError, ConfigMap, PluginError};
use posflow_store::StoreError;

/// Run a store call unless the dispatch is cancelled first.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, PluginError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PluginError::Cancelled),
        result = call => result.map_err(PluginError::dependency),
    }
}

/// Expected type of a config value.
#[derive(Clone, Copy)]
pub(crate) enum Accepts {
    Bool,
    /// Unsigned integer within the inclusive range.
    Integer(u64, u64),
}

/// Check every key in `config` against the plugin's accepted keys.
pub(crate) fn validate(config: &ConfigMap, accepted: &[(&str, Accepts)]) -> Result<(), ConfigError> {
    for (key, value) in config {
        let Some((_, accepts)) = accepted.iter().find(|(name, _)| name == key) else {
            return Err(ConfigError::new(key, "unknown key"));
        };
        match *accepts {
            Accepts::Bool if !value.is_boolean() => {
                return Err(ConfigError::new(key, "expected a boolean"));
            }
            Accepts::Integer(min, max) => match value.as_u64() {
                Some(n) if (min..=max).contains(&n) => {}
                _ => {
                    return Err(ConfigError::new(
                        key,
                        format!("expected an integer between {min} and {max}"),
                    ))
                }
            },
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn bool_or(config: &ConfigMap, key: &str, default: bool) -> bool {
    config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub(crate) fn u64_or(config: &ConfigMap, key: &str, default: u64) -> u64 {
    config.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}
