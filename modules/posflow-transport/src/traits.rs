use async_trait::async_trait;
use posflow_events::Event;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// One raw message from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Position in the source, assigned on receipt.
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Inbound side of the broker.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` once the source is closed and drained.
    async fn recv(&mut self) -> Option<Message>;

    /// Mark a message as processed. Uncommitted messages are the ones a
    /// durable broker would redeliver.
    async fn commit(&mut self, offset: u64) -> Result<(), TransportError>;
}

/// Outbound side: anything that can carry an event to the ingest path.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &Event, cancel: &CancellationToken) -> Result<(), TransportError>;
}
