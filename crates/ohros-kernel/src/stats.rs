//! [`StatsReporter`] – bridge counters with a rate-limited snapshot.
//!
//! Both the poll loop and the command handlers bump counters here.
//! [`StatsReporter::maybe_emit`] hands out a [`StatsSnapshot`] at most once
//! per interval unless the caller forces it; what happens to the snapshot
//! (log line, bus event, openHAB item) is up to the caller.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use ohros_types::StatsSnapshot;
use tracing::info;

/// Default spacing between unforced emissions.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Statistics {
    updates: u64,
    commands: u64,
    errors: u64,
    next_emit: Instant,
}

/// Shared counters plus the emission schedule, behind one lock.
#[derive(Debug)]
pub struct StatsReporter {
    interval: Duration,
    inner: Mutex<Statistics>,
}

impl StatsReporter {
    /// Create a reporter. The first unforced [`maybe_emit`](Self::maybe_emit)
    /// is allowed immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: Mutex::new(Statistics {
                updates: 0,
                commands: 0,
                errors: 0,
                next_emit: Instant::now(),
            }),
        }
    }

    /// Count `n` item changes published downstream.
    pub fn record_updates(&self, n: u64) {
        self.lock().updates += n;
    }

    /// Count one inbound command or set request.
    pub fn record_command(&self) {
        self.lock().commands += 1;
    }

    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    /// Current counters, without touching the schedule.
    pub fn snapshot(&self) -> StatsSnapshot {
        let stats = self.lock();
        StatsSnapshot {
            timestamp: Utc::now(),
            updates: stats.updates,
            commands: stats.commands,
            errors: stats.errors,
        }
    }

    /// Return a snapshot if `force` is set or the interval has elapsed since
    /// the last emission, and push the next emission time out by one
    /// interval.  Returns `None` when rate-limited.
    pub fn maybe_emit(&self, force: bool) -> Option<StatsSnapshot> {
        self.maybe_emit_at(force, Instant::now())
    }

    /// [`maybe_emit`](Self::maybe_emit) against an explicit clock reading.
    pub fn maybe_emit_at(&self, force: bool, now: Instant) -> Option<StatsSnapshot> {
        let snapshot = {
            let mut stats = self.lock();
            if !force && now < stats.next_emit {
                return None;
            }
            stats.next_emit = now + self.interval;
            StatsSnapshot {
                timestamp: Utc::now(),
                updates: stats.updates,
                commands: stats.commands,
                errors: stats.errors,
            }
        };
        info!(
            updates = snapshot.updates,
            commands = snapshot.commands,
            errors = snapshot.errors,
            forced = force,
            "bridge stats"
        );
        Some(snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, Statistics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_INTERVAL)
    }
}
