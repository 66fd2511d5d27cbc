//! `ohros-kernel` – Bridge state
//!
//! The shared state machines of the bridge. Nothing in here performs I/O;
//! every type is safe to share between the poll loop and the command
//! handlers.
//!
//! # Modules
//!
//! - [`change_detector`] – [`ChangeDetector`][change_detector::ChangeDetector]:
//!   remembers the value last published per item and filters out repeats
//!   from full-group snapshots.
//! - [`retry`] – [`RetryScheduler`][retry::RetryScheduler]:
//!   exponential backoff, doubled per failure and clamped at a ceiling.
//! - [`stats`] – [`StatsReporter`][stats::StatsReporter]:
//!   update/command/error counters with a rate-limited snapshot.

pub mod change_detector;
pub mod retry;
pub mod stats;

pub use change_detector::ChangeDetector;
pub use retry::RetryScheduler;
pub use stats::StatsReporter;
