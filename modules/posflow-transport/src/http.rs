use std::time::Duration;

use async_trait::async_trait;
use posflow_events::{wire, Event};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;
use crate::traits::EventSink;

/// Posts wire-encoded events to a server's ingest endpoint
/// (`POST {base_url}/api/events`).
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/events", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, event: &Event, cancel: &CancellationToken) -> Result<(), TransportError> {
        let body = wire::encode(event)?;
        debug!(event_id = event.id(), kind = %event.kind(), "Posting event");
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.post(body) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let sink = HttpEventSink::new("http://localhost:8080/").unwrap();
        assert_eq!(sink.endpoint(), "http://localhost:8080/api/events");
    }
}
