//! [`StatsPublisher`] – where stats snapshots go.
//!
//! Wraps the shared [`StatsReporter`] and routes every snapshot it releases
//! to the configured [`StatsSink`]: the log line written by the reporter
//! itself, the [`Topic::Stats`] bus lane, and optionally an openHAB item.

use std::sync::Arc;

use ohros_kernel::StatsReporter;
use ohros_middleware::{EventBus, Topic};
use ohros_types::{Event, EventPayload, StatsSnapshot};
use tracing::{debug, warn};

use crate::source::SourceClient;

/// Extra destination for stats snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatsSink {
    /// Log and bus only.
    #[default]
    Log,
    /// Also write the snapshot text as the state of this openHAB item.
    SourceItem(String),
}

/// Cheaply cloneable handle shared by the poll loop and the command router.
#[derive(Clone)]
pub struct StatsPublisher {
    reporter: Arc<StatsReporter>,
    bus: Arc<EventBus>,
    client: Arc<dyn SourceClient>,
    sink: StatsSink,
}

impl StatsPublisher {
    pub fn new(
        reporter: Arc<StatsReporter>,
        bus: Arc<EventBus>,
        client: Arc<dyn SourceClient>,
        sink: StatsSink,
    ) -> Self {
        Self {
            reporter,
            bus,
            client,
            sink,
        }
    }

    /// The shared counters.
    pub fn reporter(&self) -> &StatsReporter {
        &self.reporter
    }

    /// Emit a snapshot if the reporter allows it (always when `force`).
    ///
    /// Sink failures are counted as errors and logged; they never propagate.
    pub async fn report(&self, force: bool) -> Option<StatsSnapshot> {
        let snapshot = self.reporter.maybe_emit(force)?;

        let event = Event::new("ohros-runtime::stats", EventPayload::Stats(snapshot.clone()));
        if let Err(e) = self.bus.publish_to(Topic::Stats, event) {
            debug!(error = %e, "stats not published on bus");
        }

        if let StatsSink::SourceItem(item) = &self.sink
            && let Err(e) = self.client.set_state(item, &snapshot.to_string()).await
        {
            self.reporter.record_error();
            warn!(item = %item, kind = %e.kind(), error = %e, "failed to write stats item");
        }

        Some(snapshot)
    }
}
