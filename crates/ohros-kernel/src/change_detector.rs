//! [`ChangeDetector`] – duplicate suppression for polled item values.
//!
//! openHAB returns the *whole* group every time any member changes, so most
//! values in a snapshot are repeats.  The detector remembers the value last
//! published for each item key and only lets novel values through.
//!
//! The map always holds "the value as last published downstream": a key is
//! emitted iff it is absent from the map or its value differs from the
//! stored one.
//!
//! # Example
//!
//! ```
//! use ohros_kernel::change_detector::ChangeDetector;
//!
//! let detector = ChangeDetector::new();
//! assert!(detector.observe("temp", "70"));
//! assert!(!detector.observe("temp", "70"));
//! assert!(detector.observe("temp", "71"));
//!
//! detector.clear();
//! assert!(detector.observe("temp", "71"));
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last-published value per item key, behind a single lock.
///
/// Shared between the poll loop (which calls [`observe`](Self::observe)) and
/// the command router (which calls [`clear`](Self::clear) on a refresh
/// directive) through an `Arc`.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Mutex<HashMap<String, String>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and report whether it should be emitted.
    ///
    /// Lookup and update happen under one lock acquisition, so a concurrent
    /// [`clear`](Self::clear) lands either entirely before or entirely after.
    pub fn observe(&self, key: &str, value: &str) -> bool {
        let mut map = self.lock();
        match map.get_mut(key) {
            Some(current) if current == value => false,
            Some(current) => {
                value.clone_into(current);
                true
            }
            None => {
                map.insert(key.to_string(), value.to_string());
                true
            }
        }
    }

    /// Forget every stored value so the next snapshot is emitted in full.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Value last published for `key`, if any.
    pub fn last_value(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.previous.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_observation_emits() {
        let detector = ChangeDetector::new();
        assert!(detector.observe("temp", "70"));
        assert_eq!(detector.last_value("temp").as_deref(), Some("70"));
    }

    #[test]
    fn repeated_value_emits_once() {
        let detector = ChangeDetector::new();
        let emitted = (0..10).filter(|_| detector.observe("temp", "70")).count();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn changed_value_emits_and_updates() {
        let detector = ChangeDetector::new();
        assert!(detector.observe("temp", "70"));
        assert!(detector.observe("temp", "71"));
        assert!(!detector.observe("temp", "71"));
        // Going back to an older value is still a change.
        assert!(detector.observe("temp", "70"));
        assert_eq!(detector.last_value("temp").as_deref(), Some("70"));
    }

    #[test]
    fn keys_are_independent() {
        let detector = ChangeDetector::new();
        assert!(detector.observe("a", "1"));
        assert!(detector.observe("b", "1"));
        assert!(!detector.observe("a", "1"));
        assert_eq!(detector.len(), 2);
    }

    #[test]
    fn clear_forces_reemission() {
        let detector = ChangeDetector::new();
        assert!(detector.observe("a", "1"));
        assert!(detector.observe("b", "2"));
        detector.clear();
        assert!(detector.is_empty());
        assert!(detector.observe("a", "1"));
        assert!(detector.observe("b", "2"));
    }

    #[test]
    fn emission_matches_last_emitted_value_across_sequence() {
        let detector = ChangeDetector::new();
        let sequence = ["1", "1", "2", "2", "2", "1", "3", "3"];
        let expected = [true, false, true, false, false, true, true, false];
        let mut last: Option<&str> = None;
        for (value, want) in sequence.iter().zip(expected) {
            let got = detector.observe("k", value);
            assert_eq!(got, want, "value {value}");
            assert_eq!(got, last != Some(*value));
            last = Some(value);
        }
    }

    #[test]
    fn concurrent_observers_emit_each_value_once() {
        let detector = Arc::new(ChangeDetector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&detector);
                thread::spawn(move || d.observe("shared", "on") as usize)
            })
            .collect();
        let emitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(emitted, 1);
    }
}
