//! [`RetryScheduler`] – exponential backoff for the poll loop.
//!
//! The delay starts at `initial`, doubles after every failed cycle and is
//! clamped at `ceiling`.  A successful cycle resets it.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ohros_kernel::retry::RetryScheduler;
//!
//! let mut retry = RetryScheduler::new(Duration::from_millis(125), Duration::from_secs(1));
//! retry.on_failure();
//! assert_eq!(retry.current_delay(), Duration::from_millis(250));
//! retry.on_success();
//! assert_eq!(retry.current_delay(), Duration::from_millis(125));
//! ```

use std::time::Duration;

/// Default first backoff step.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(125);

/// Default upper bound for the backoff.
pub const DEFAULT_CEILING: Duration = Duration::from_secs(257);

const GROWTH_FACTOR: u32 = 2;

/// Smallest accepted initial delay; a zero delay would never grow.
pub const MIN_INITIAL_DELAY: Duration = Duration::from_millis(1);

/// Backoff state owned by a single poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryScheduler {
    initial: Duration,
    ceiling: Duration,
    current: Duration,
}

impl RetryScheduler {
    /// Create a scheduler starting at `initial` and never exceeding `ceiling`.
    ///
    /// `initial` is raised to [`MIN_INITIAL_DELAY`], and a `ceiling` below
    /// `initial` is raised to `initial`.
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        let initial = initial.max(MIN_INITIAL_DELAY);
        let ceiling = ceiling.max(initial);
        Self {
            initial,
            ceiling,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// A cycle succeeded: start over from the initial delay.
    pub fn on_success(&mut self) {
        self.current = self.initial;
    }

    /// A cycle failed: double the delay, saturating at the ceiling.
    pub fn on_failure(&mut self) {
        self.current = self
            .current
            .checked_mul(GROWTH_FACTOR)
            .map_or(self.ceiling, |next| next.min(self.ceiling));
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn starts_at_initial() {
        let retry = RetryScheduler::default();
        assert_eq!(retry.current_delay(), DEFAULT_INITIAL_DELAY);
    }

    #[test]
    fn doubles_on_each_failure() {
        let mut retry = RetryScheduler::new(ms(100), ms(10_000));
        let mut seen = vec![retry.current_delay()];
        for _ in 0..4 {
            retry.on_failure();
            seen.push(retry.current_delay());
        }
        assert_eq!(seen, vec![ms(100), ms(200), ms(400), ms(800), ms(1600)]);
    }

    #[test]
    fn clamps_at_ceiling() {
        let mut retry = RetryScheduler::new(ms(125), ms(1000));
        for _ in 0..50 {
            retry.on_failure();
            assert!(retry.current_delay() <= ms(1000));
        }
        assert_eq!(retry.current_delay(), ms(1000));
    }

    #[test]
    fn default_ceiling_is_reached_without_overflow() {
        let mut retry = RetryScheduler::default();
        for _ in 0..200 {
            retry.on_failure();
        }
        assert_eq!(retry.current_delay(), DEFAULT_CEILING);
    }

    #[test]
    fn success_resets_to_initial() {
        let mut retry = RetryScheduler::new(ms(125), ms(257_000));
        retry.on_failure();
        retry.on_failure();
        assert_eq!(retry.current_delay(), ms(500));
        retry.on_success();
        assert_eq!(retry.current_delay(), ms(125));
        retry.on_failure();
        assert_eq!(retry.current_delay(), ms(250));
    }

    #[test]
    fn ceiling_below_initial_is_raised() {
        let retry = RetryScheduler::new(ms(500), ms(100));
        assert_eq!(retry.ceiling(), ms(500));
        assert_eq!(retry.initial_delay(), ms(500));
    }

    #[test]
    fn zero_initial_delay_still_backs_off() {
        let mut retry = RetryScheduler::new(Duration::ZERO, Duration::from_secs(257));
        assert_eq!(retry.initial_delay(), MIN_INITIAL_DELAY);
        for _ in 0..10 {
            retry.on_failure();
        }
        assert_eq!(retry.current_delay(), ms(1024));
    }
}
