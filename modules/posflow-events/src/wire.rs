//! JSON wire codec. One message carries one event:
//! `{"id", "type", "timestamp", "payload"}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Event, EventKind};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed event message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event message has an empty type")]
    EmptyKind,
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode a wire message. A missing or empty id is replaced with a fresh one.
pub fn decode(bytes: &[u8]) -> Result<Event, WireError> {
    let wire: WireEvent = serde_json::from_slice(bytes)?;
    if wire.kind.trim().is_empty() {
        return Err(WireError::EmptyKind);
    }

    let id = match wire.id {
        Some(id) if !id.is_empty() => id,
        _ => {
            let id = Uuid::new_v4().to_string();
            debug!(%id, kind = wire.kind.as_str(), "wire: assigned id to anonymous event");
            id
        }
    };

    Ok(Event::from_parts(
        id,
        EventKind::from(wire.kind),
        wire.timestamp,
        wire.payload,
    ))
}

pub fn encode(event: &Event) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(event)?)
}
