//! [`PollingEngine`] – turns openHAB group snapshots into change events.
//!
//! Each cycle:
//!
//! 1. **Fetch** – one request for the full member list of the configured
//!    group (long-poll or short-poll, see [`PollMode`]).
//! 2. **Filter** – every `(name, state)` goes through the shared
//!    [`ChangeDetector`]; only novel values survive.
//! 3. **Publish** – survivors are published on [`Topic::ItemUpdates`] and
//!    counted.
//! 4. **Pace** – after a failure the loop sleeps for the current backoff and
//!    then doubles it; after a success it continues immediately (long-poll)
//!    or after the short-poll interval.
//!
//! No failure ever leaves the loop: transport, protocol, parse and
//! unexpected errors all become `connected = false`.

use std::sync::Arc;
use std::time::Duration;

use ohros_kernel::{ChangeDetector, RetryScheduler};
use ohros_middleware::{EventBus, Topic};
use ohros_types::{BridgeError, Event, EventPayload, ItemUpdate};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::reporting::StatsPublisher;
use crate::source::{PollMode, SourceClient};

const EVENT_SOURCE: &str = "ohros-runtime::poll";

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    pub connected: bool,
    /// Members returned by the source system.
    pub items_observed: usize,
    /// Members that passed the change detector and were published.
    pub items_changed: usize,
}

impl PollResult {
    fn disconnected() -> Self {
        Self {
            connected: false,
            items_observed: 0,
            items_changed: 0,
        }
    }
}

/// Static settings of a [`PollingEngine`].
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// openHAB group item whose members are bridged.
    pub group: String,
    pub mode: PollMode,
    /// Pause after a successful short-poll cycle.
    pub short_poll_interval: Duration,
    pub retry: RetryScheduler,
}

/// The poll loop. Owns the change detector and hands out shared references
/// to it via [`detector`](Self::detector).
pub struct PollingEngine {
    client: Arc<dyn SourceClient>,
    bus: Arc<EventBus>,
    stats: StatsPublisher,
    detector: Arc<ChangeDetector>,
    config: PollingConfig,
    retry: RetryScheduler,
    /// `None` until the first cycle completes.
    connected: Option<bool>,
}

impl PollingEngine {
    pub fn new(
        client: Arc<dyn SourceClient>,
        bus: Arc<EventBus>,
        stats: StatsPublisher,
        config: PollingConfig,
    ) -> Self {
        Self {
            client,
            bus,
            stats,
            detector: Arc::new(ChangeDetector::new()),
            retry: config.retry.clone(),
            config,
            connected: None,
        }
    }

    /// Shared handle to the previous-state map, for the command router.
    pub fn detector(&self) -> Arc<ChangeDetector> {
        Arc::clone(&self.detector)
    }

    pub fn retry(&self) -> &RetryScheduler {
        &self.retry
    }

    /// Fetch the group once and publish whatever changed.
    ///
    /// Resets the backoff on success. Never fails; errors are counted,
    /// logged and reported as `connected = false`.
    #[instrument(skip(self), fields(group = %self.config.group))]
    pub async fn poll_once(&mut self) -> PollResult {
        match self.client.fetch_group(&self.config.group).await {
            Ok(members) => {
                let items_observed = members.len();
                let mut items_changed = 0;
                for item in members {
                    if self.detector.observe(&item.key, &item.value) {
                        items_changed += 1;
                        self.publish_change(item);
                    }
                }
                self.stats.reporter().record_updates(items_changed as u64);
                self.retry.on_success();
                self.mark_connected(items_observed, items_changed);
                PollResult {
                    connected: true,
                    items_observed,
                    items_changed,
                }
            }
            Err(e) => {
                self.stats.reporter().record_error();
                self.mark_disconnected(&e);
                PollResult::disconnected()
            }
        }
    }

    /// One full cycle: poll, report stats, pace.
    ///
    /// Returns early from the pause if `shutdown` flips.
    pub async fn step(&mut self, shutdown: &mut watch::Receiver<bool>) -> PollResult {
        let result = self.poll_once().await;
        self.stats.report(false).await;

        if let Some(pause) = self.pause_after(&result) {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_requested(shutdown) => {}
            }
        }
        if !result.connected {
            self.retry.on_failure();
        }
        result
    }

    /// Drive [`step`](Self::step) until `shutdown` becomes `true`. A request
    /// already in flight is allowed to finish. If every sender is dropped
    /// the loop keeps running, since shutdown can no longer be requested.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.config.group,
            mode = ?self.config.mode,
            "poll loop started"
        );
        while !*shutdown.borrow_and_update() {
            self.step(&mut shutdown).await;
        }
        info!("poll loop stopped");
    }

    fn pause_after(&self, result: &PollResult) -> Option<Duration> {
        if !result.connected {
            Some(self.retry.current_delay())
        } else if self.config.mode == PollMode::ShortPoll {
            Some(self.config.short_poll_interval)
        } else {
            None
        }
    }

    fn publish_change(&self, item: ItemUpdate) {
        debug!(item = %item.key, value = %item.value, "item changed");
        let event = Event::new(EVENT_SOURCE, EventPayload::ItemChanged(item));
        if let Err(e) = self.bus.publish_to(Topic::ItemUpdates, event) {
            debug!(error = %e, "no ros subscribers for item update");
        }
    }

    fn mark_connected(&mut self, observed: usize, changed: usize) {
        if self.connected == Some(true) {
            debug!(observed, changed, "poll cycle ok");
        } else {
            info!(observed, changed, "connected to openHAB");
        }
        self.connected = Some(true);
    }

    fn mark_disconnected(&mut self, error: &BridgeError) {
        let retry_in = self.retry.current_delay();
        if self.connected == Some(false) {
            debug!(kind = %error.kind(), error = %error, ?retry_in, "still disconnected");
        } else {
            warn!(kind = %error.kind(), error = %error, ?retry_in, "lost connection to openHAB");
            let event = Event::new(
                EVENT_SOURCE,
                EventPayload::BridgeFault {
                    component: "openhab".to_string(),
                    message: error.to_string(),
                },
            );
            if let Err(e) = self.bus.publish_to(Topic::Faults, event) {
                debug!(error = %e, "no subscribers for bridge fault");
            }
        }
        self.connected = Some(false);
    }
}

/// Resolves when `shutdown` changes; never resolves once its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}
