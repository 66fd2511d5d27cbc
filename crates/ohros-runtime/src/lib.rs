//! `ohros-runtime` – The bridge loops
//!
//! Wires the kernel state machines to the outside world.
//!
//! # Modules
//!
//! - [`source`] – [`SourceClient`][source::SourceClient] and its `reqwest`
//!   implementation [`OpenHabClient`][source::OpenHabClient]: group snapshot
//!   reads, device commands and state sets, with every failure mapped onto
//!   [`BridgeError`][ohros_types::BridgeError].
//! - [`polling`] – [`PollingEngine`][polling::PollingEngine]: the
//!   fetch → filter → publish → pace loop with exponential backoff.
//! - [`router`] – [`CommandRouter`][router::CommandRouter]: classifies
//!   inbound ROS messages into control directives, device commands and
//!   state sets.
//! - [`reporting`] – [`StatsPublisher`][reporting::StatsPublisher]: sends
//!   rate-limited counter snapshots to the bus and, optionally, an item.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: log
//!   formatting and optional OTLP span export.

pub mod polling;
pub mod reporting;
pub mod router;
pub mod source;
pub mod telemetry;

#[cfg(test)]
mod fake;

pub use polling::{PollResult, PollingConfig, PollingEngine};
pub use reporting::{StatsPublisher, StatsSink};
pub use router::CommandRouter;
pub use source::{OpenHabClient, PollMode, SourceClient, SourceSettings};
pub use telemetry::{TracerProviderGuard, init_tracing};
