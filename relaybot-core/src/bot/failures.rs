//! src/bot/failures.rs
//!
//! Bounded history of plugin failures caught at the dispatch boundary.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Load,
    Save,
    Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    /// Service the failing call was made for, if any.
    pub service: Option<String>,
    pub stage: FailureStage,
    pub reason: String,
    pub at: DateTime<Utc>,
}

pub(crate) struct FailureLog {
    entries: Mutex<VecDeque<PluginFailure>>,
    capacity: usize,
    total: AtomicU64,
}

impl FailureLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            total: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, failure: PluginFailure) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(failure);
    }

    pub(crate) fn snapshot(&self) -> Vec<PluginFailure> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
