//! The dispatch loop.
//!
//! Snapshot active plugins → fan out one task per plugin → record stats →
//! recurse into emitted events until the call tree settles. Failures are
//! collected from the whole tree; one plugin failing never stops its siblings
//! or the dispatch of its own emitted events.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use posflow_events::{Event, EventKind};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::plugin::{Outcome, Plugin};
use crate::registry::Registry;
use crate::stats::StatsTracker;

pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deepest follow-on generation that will still be dispatched. The
    /// inbound event is depth 0. Deeper events fail with `DepthExceeded`
    /// instead of running, which bounds plugin cycles.
    pub max_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Counts for a successful dispatch, over the whole call tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events routed, the inbound one included.
    pub events_dispatched: usize,
    /// Plugin `process` calls made.
    pub handler_calls: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.events_dispatched += other.events_dispatched;
        self.handler_calls += other.handler_calls;
    }
}

#[derive(Debug, Error)]
pub enum FailureKind {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("follow-on event exceeds max dispatch depth {limit}")]
    DepthExceeded { limit: usize },

    #[error("dispatch cancelled before routing")]
    Cancelled,

    /// The plugin task was torn down by the runtime.
    #[error("plugin task aborted: {0}")]
    Aborted(String),
}

/// One failure somewhere in a dispatch call tree.
#[derive(Debug, Error)]
#[error(
    "{} on {event_kind} ({event_id}) at depth {depth}: {kind}",
    .plugin.as_deref().unwrap_or("dispatcher")
)]
pub struct HandlerFailure {
    /// Failing plugin; for depth and cancellation failures, the plugin that
    /// emitted the event (`None` for the inbound event).
    pub plugin: Option<String>,
    pub event_id: String,
    pub event_kind: EventKind,
    pub depth: usize,
    #[source]
    pub kind: FailureKind,
}

/// Aggregated failures from one dispatch call and all its descendants.
#[derive(Debug, Error)]
pub struct DispatchError {
    pub failures: Vec<HandlerFailure>,
    pub report: DispatchReport,
}

impl DispatchError {
    /// Names of plugins that failed, in failure order, deduplicated.
    pub fn failed_plugins(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.failures.iter().filter_map(|f| f.plugin.as_deref()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} plugin failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

/// Running result of one subtree.
#[derive(Default)]
struct Tally {
    report: DispatchReport,
    failures: Vec<HandlerFailure>,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.report.merge(other.report);
        self.failures.extend(other.failures);
    }

    fn into_result(self) -> Result<DispatchReport, DispatchError> {
        if self.failures.is_empty() {
            Ok(self.report)
        } else {
            Err(DispatchError {
                failures: self.failures,
                report: self.report,
            })
        }
    }
}

/// Routes events through the registry's active plugins.
///
/// Stateless between calls: registry and stats are shared handles, so the
/// dispatcher is cheap to clone into tasks.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    stats: Arc<StatsTracker>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, stats: Arc<StatsTracker>) -> Self {
        Self {
            registry,
            stats,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    /// Dispatch an event and every event it transitively causes.
    ///
    /// Returns `Err` if any plugin anywhere in the tree failed. Cancelling
    /// `cancel` reaches every plugin call and every recursive dispatch; no
    /// timeout is applied here.
    pub async fn dispatch(
        &self,
        event: Event,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch_at(Arc::new(event), cancel.clone(), 0, None)
            .await
            .into_result()
    }

    fn dispatch_at(
        &self,
        event: Arc<Event>,
        cancel: CancellationToken,
        depth: usize,
        origin: Option<String>,
    ) -> BoxFuture<'static, Tally> {
        let this = self.clone();
        async move {
            let mut tally = Tally::default();

            if cancel.is_cancelled() {
                tally.failures.push(failure(&event, origin, depth, FailureKind::Cancelled));
                return tally;
            }
            if depth > this.config.max_depth {
                warn!(
                    event_id = event.id(),
                    kind = %event.kind(),
                    depth,
                    origin = origin.as_deref().unwrap_or("-"),
                    "dispatch: max depth exceeded, dropping event"
                );
                tally.failures.push(failure(
                    &event,
                    origin,
                    depth,
                    FailureKind::DepthExceeded {
                        limit: this.config.max_depth,
                    },
                ));
                return tally;
            }

            tally.report.events_dispatched = 1;

            let candidates: Vec<Arc<dyn Plugin>> = this
                .registry
                .active()
                .into_iter()
                .filter(|p| p.reacts_to(event.kind()))
                .collect();

            debug!(
                event_id = event.id(),
                kind = %event.kind(),
                depth,
                candidates = candidates.len(),
                "dispatch: routing event"
            );

            let (names, handles): (Vec<String>, Vec<_>) = candidates
                .into_iter()
                .map(|plugin| {
                    let name = plugin.name().to_string();
                    let task = this
                        .clone()
                        .run_plugin(plugin, event.clone(), cancel.clone(), depth);
                    (name, tokio::spawn(task))
                })
                .unzip();

            for (name, joined) in names.into_iter().zip(join_all(handles).await) {
                match joined {
                    Ok(subtree) => tally.merge(subtree),
                    Err(e) => {
                        warn!(plugin = name.as_str(), error = %e, "dispatch: plugin task aborted");
                        tally.failures.push(failure(
                            &event,
                            Some(name),
                            depth,
                            FailureKind::Aborted(e.to_string()),
                        ));
                    }
                }
            }

            tally
        }
        .boxed()
    }

    /// One plugin's share of a dispatch: process, record stats, then
    /// dispatch whatever it emitted (even if it also failed).
    async fn run_plugin(
        self,
        plugin: Arc<dyn Plugin>,
        event: Arc<Event>,
        cancel: CancellationToken,
        depth: usize,
    ) -> Tally {
        let name = plugin.name().to_string();

        let outcome = match AssertUnwindSafe(plugin.process(&event, &cancel))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Outcome::failed(PluginError::Panicked(panic_message(panic.as_ref()))),
        };

        // Deactivated between the snapshot and the call.
        if outcome.is_skipped() {
            debug!(plugin = name.as_str(), event_id = event.id(), "dispatch: plugin skipped event");
            return Tally::default();
        }

        self.stats
            .record(&name, event.timestamp(), outcome.is_err());

        let mut tally = Tally::default();
        tally.report.handler_calls = 1;

        if let Some(err) = outcome.error {
            warn!(
                plugin = name.as_str(),
                event_id = event.id(),
                kind = %event.kind(),
                error = %err,
                "dispatch: plugin failed"
            );
            tally
                .failures
                .push(failure(&event, Some(name.clone()), depth, FailureKind::Plugin(err)));
        }

        if !outcome.emitted.is_empty() {
            debug!(
                plugin = name.as_str(),
                emitted = outcome.emitted.len(),
                "dispatch: dispatching follow-on events"
            );
            let children = outcome.emitted.into_iter().map(|child| {
                self.dispatch_at(Arc::new(child), cancel.clone(), depth + 1, Some(name.clone()))
            });
            for subtree in join_all(children).await {
                tally.merge(subtree);
            }
        }

        tally
    }
}

fn failure(event: &Event, plugin: Option<String>, depth: usize, kind: FailureKind) -> HandlerFailure {
    HandlerFailure {
        plugin,
        event_id: event.id().to_string(),
        event_kind: event.kind().clone(),
        depth,
        kind,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
