//! Broker consumer loop.
//!
//! receive → decode → dispatch (with retries) → commit on success.
//!
//! Undecodable messages are committed so they are not redelivered forever.
//! Events still failing after every retry are logged and left uncommitted;
//! a durable broker would hand them out again.

use std::time::Duration;

use posflow_engine::{DispatchError, DispatchReport, Dispatcher};
use posflow_events::{wire, Event};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::traits::{Message, MessageSource};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Retries after the first failed dispatch.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Upper bound for one dispatch attempt. On expiry the attempt's token
    /// is cancelled and the attempt counts as failed.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
            dispatch_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStats {
    pub received: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub malformed: u64,
}

enum Attempt {
    Done(DispatchReport),
    Failed(DispatchError),
    TimedOut,
}

pub struct Consumer<S> {
    source: S,
    dispatcher: Dispatcher,
    config: ConsumerConfig,
    stats: ConsumerStats,
}

impl<S: MessageSource> Consumer<S> {
    pub fn new(source: S, dispatcher: Dispatcher, config: ConsumerConfig) -> Self {
        Self {
            source,
            dispatcher,
            config,
            stats: ConsumerStats::default(),
        }
    }

    /// Consume until the source closes or `cancel` fires. Returns final stats.
    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerStats {
        info!(
            retry_attempts = self.config.retry_attempts,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Consumer started"
        );

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.source.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message, &cancel).await;
        }

        info!(
            received = self.stats.received,
            dispatched = self.stats.dispatched,
            failed = self.stats.failed,
            malformed = self.stats.malformed,
            "Consumer stopped"
        );
        self.stats
    }

    async fn handle(&mut self, message: Message, cancel: &CancellationToken) {
        self.stats.received += 1;

        let event = match wire::decode(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "Skipping malformed message");
                self.stats.malformed += 1;
                self.commit(message.offset).await;
                return;
            }
        };

        match self.dispatch_with_retry(&event, cancel).await {
            Some(report) => {
                self.stats.dispatched += 1;
                info!(
                    offset = message.offset,
                    event_id = event.id(),
                    kind = %event.kind(),
                    events = report.events_dispatched,
                    handler_calls = report.handler_calls,
                    "Event dispatched"
                );
                self.commit(message.offset).await;
            }
            None => {
                self.stats.failed += 1;
            }
        }
    }

    /// `Some` once an attempt succeeds; `None` after the last retry or on
    /// shutdown.
    async fn dispatch_with_retry(
        &self,
        event: &Event,
        cancel: &CancellationToken,
    ) -> Option<DispatchReport> {
        let attempts = self.config.retry_attempts + 1;

        for attempt in 1..=attempts {
            match self.attempt(event, cancel).await {
                Attempt::Done(report) => return Some(report),
                Attempt::Failed(err) if attempt == attempts || cancel.is_cancelled() => {
                    error!(
                        event_id = event.id(),
                        kind = %event.kind(),
                        attempts = attempt,
                        failed_plugins = ?err.failed_plugins(),
                        error = %err,
                        "Dispatch failed, leaving message uncommitted"
                    );
                    return None;
                }
                Attempt::TimedOut if attempt == attempts || cancel.is_cancelled() => {
                    error!(
                        event_id = event.id(),
                        kind = %event.kind(),
                        attempts = attempt,
                        "Dispatch timed out, leaving message uncommitted"
                    );
                    return None;
                }
                Attempt::Failed(err) => {
                    warn!(event_id = event.id(), attempt, error = %err, "Dispatch failed, retrying");
                }
                Attempt::TimedOut => {
                    warn!(event_id = event.id(), attempt, "Dispatch timed out, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }

        None
    }

    async fn attempt(&self, event: &Event, cancel: &CancellationToken) -> Attempt {
        let Some(limit) = self.config.dispatch_timeout else {
            return match self.dispatcher.dispatch(event.clone(), cancel).await {
                Ok(report) => Attempt::Done(report),
                Err(err) => Attempt::Failed(err),
            };
        };

        // Child token so a timeout stops this attempt's plugins without
        // shutting the consumer down.
        let attempt_cancel = cancel.child_token();
        match tokio::time::timeout(limit, self.dispatcher.dispatch(event.clone(), &attempt_cancel)).await {
            Ok(Ok(report)) => Attempt::Done(report),
            Ok(Err(err)) => Attempt::Failed(err),
            Err(_) => {
                attempt_cancel.cancel();
                Attempt::TimedOut
            }
        }
    }

    async fn commit(&mut self, offset: u64) {
        if let Err(e) = self.source.commit(offset).await {
            warn!(offset, error = %e, "Commit failed");
        }
    }
}
