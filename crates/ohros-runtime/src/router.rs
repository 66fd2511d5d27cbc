//! [`CommandRouter`] – ROS → openHAB write path.
//!
//! Inbound [`CommandEvent`]s are classified into three kinds:
//!
//! | Event | Action |
//! |---|---|
//! | `command` with key [`CONTROL_KEY`] | control-plane [`Directive`]; never written to openHAB |
//! | `command` with any other key | `POST` device command |
//! | `set` | `PUT` item state |
//!
//! The router is best-effort: a failed write is counted and logged, never
//! retried and never propagated.  Every inbound event counts as exactly one
//! command, whatever happens to it.

use std::sync::Arc;

use ohros_kernel::ChangeDetector;
use ohros_middleware::TopicReceiver;
use ohros_types::{CONTROL_KEY, CommandEvent, CommandKind, Directive, EventPayload};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use crate::reporting::StatsPublisher;
use crate::source::SourceClient;

/// Cheaply cloneable; clones share the client, detector and counters.
#[derive(Clone)]
pub struct CommandRouter {
    client: Arc<dyn SourceClient>,
    detector: Arc<ChangeDetector>,
    stats: StatsPublisher,
}

impl CommandRouter {
    /// `detector` must be the poll engine's own instance so a refresh
    /// directive affects the next cycle.
    pub fn new(
        client: Arc<dyn SourceClient>,
        detector: Arc<ChangeDetector>,
        stats: StatsPublisher,
    ) -> Self {
        Self {
            client,
            detector,
            stats,
        }
    }

    /// Handle a message from the ROS `command` channel.
    #[instrument(skip(self))]
    pub async fn on_command(&self, key: &str, value: &str) {
        self.stats.reporter().record_command();

        if key == CONTROL_KEY {
            self.apply_directive(value).await;
        } else if let Err(e) = self.client.send_command(key, value).await {
            self.stats.reporter().record_error();
            warn!(item = %key, kind = %e.kind(), error = %e, "device command failed");
        }

        self.stats.report(false).await;
    }

    /// Handle a message from the ROS `set` channel.
    #[instrument(skip(self))]
    pub async fn on_set(&self, key: &str, value: &str) {
        self.stats.reporter().record_command();

        if let Err(e) = self.client.set_state(key, value).await {
            self.stats.reporter().record_error();
            warn!(item = %key, kind = %e.kind(), error = %e, "state update failed");
        }

        self.stats.report(false).await;
    }

    /// Dispatch `event` to [`on_command`](Self::on_command) or
    /// [`on_set`](Self::on_set).
    pub async fn handle(&self, event: &CommandEvent) {
        match event.kind {
            CommandKind::Command => self.on_command(&event.key, &event.value).await,
            CommandKind::Set => self.on_set(&event.key, &event.value).await,
        }
    }

    /// Consume `rx` until the bus closes.
    ///
    /// Messages are handled one at a time in arrival order, so two writes to
    /// the same item reach openHAB in the order they were published. Run
    /// this on its own task to keep it concurrent with the poll loop.
    pub async fn run(self, mut rx: TopicReceiver) {
        info!("command router started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let EventPayload::Inbound(command) = event.payload {
                        self.handle(&command).await;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(dropped = n, "command router lagged; inbound commands lost");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("command router stopped");
    }

    async fn apply_directive(&self, value: &str) {
        match Directive::parse(value) {
            Ok(Directive::Refresh) => {
                self.detector.clear();
                info!("refresh requested; all items will be republished");
                self.stats.report(true).await;
            }
            Err(e) => {
                warn!(directive = %value, error = %e, "ignoring control command");
            }
        }
    }
}
