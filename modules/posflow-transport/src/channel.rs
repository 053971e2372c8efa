//! In-process broker: a bounded mpsc channel of raw wire messages.
//!
//! Publishers wait when the channel is full. Offsets are assigned in receive
//! order by the single source.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use posflow_events::{wire, Event};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;
use crate::traits::{EventSink, Message, MessageSource};

/// Open a broker holding at most `capacity` undelivered messages.
pub fn channel(capacity: usize) -> (ChannelPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelPublisher { tx },
        ChannelSource {
            rx,
            next_offset: 0,
            commits: CommitLog::default(),
        },
    )
}

#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelPublisher {
    /// Publish a raw wire message. Fails with `Closed` once the source is gone.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(payload).await.map_err(|_| TransportError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl EventSink for ChannelPublisher {
    async fn send(&self, event: &Event, cancel: &CancellationToken) -> Result<(), TransportError> {
        let payload = wire::encode(event)?;
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.publish(payload) => result,
        }
    }
}

/// Offsets committed by a `ChannelSource`, in commit order. Cloneable so the
/// log can be inspected after the source has moved into a consumer.
#[derive(Clone, Default)]
pub struct CommitLog(Arc<Mutex<Vec<u64>>>);

impl CommitLog {
    pub fn offsets(&self) -> Vec<u64> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&offset)
    }

    fn push(&self, offset: u64) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(offset);
    }
}

pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    next_offset: u64,
    commits: CommitLog,
}

impl ChannelSource {
    pub fn commits(&self) -> CommitLog {
        self.commits.clone()
    }

    /// Stop accepting new messages; already queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Option<Message> {
        let payload = self.rx.recv().await?;
        let offset = self.next_offset;
        self.next_offset += 1;
        Some(Message { offset, payload })
    }

    async fn commit(&mut self, offset: u64) -> Result<(), TransportError> {
        debug!(offset, "commit");
        self.commits.push(offset);
        Ok(())
    }
}
