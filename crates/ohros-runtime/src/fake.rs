//! Scripted in-memory [`SourceClient`] for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ohros_types::{BridgeError, ItemUpdate};

use crate::source::SourceClient;

/// A write the bridge attempted against the source system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Command { item: String, value: String },
    State { item: String, value: String },
}

#[derive(Default)]
pub struct FakeSource {
    snapshots: Mutex<VecDeque<Result<Vec<ItemUpdate>, BridgeError>>>,
    writes: Mutex<Vec<Write>>,
    fail_writes: AtomicBool,
    /// Writes carrying this value take this long to complete.
    slow_value: Mutex<Option<(String, Duration)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `fetch_group` result.
    pub fn push_snapshot(&self, items: &[(&str, &str)]) {
        let items = items.iter().map(|(k, v)| ItemUpdate::new(*k, *v)).collect();
        self.snapshots.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_error(&self, error: BridgeError) {
        self.snapshots.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn slow_writes_of(&self, value: &str, delay: Duration) {
        *self.slow_value.lock().unwrap() = Some((value.to_string(), delay));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    async fn record(&self, write: Write) -> Result<(), BridgeError> {
        let value = match &write {
            Write::Command { value, .. } | Write::State { value, .. } => value.clone(),
        };
        let delay = self
            .slow_value
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(slow, _)| *slow == value)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.writes.lock().unwrap().push(write);
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(BridgeError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_group(&self, _group: &str) -> Result<Vec<ItemUpdate>, BridgeError> {
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::Unexpected("no scripted snapshot".into())))
    }

    async fn send_command(&self, item: &str, value: &str) -> Result<(), BridgeError> {
        self.record(Write::Command {
            item: item.to_string(),
            value: value.to_string(),
        })
        .await
    }

    async fn set_state(&self, item: &str, value: &str) -> Result<(), BridgeError> {
        self.record(Write::State {
            item: item.to_string(),
            value: value.to_string(),
        })
        .await
    }
}
