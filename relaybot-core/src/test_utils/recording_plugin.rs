// src/test_utils/recording_plugin.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bot::Bot;
use crate::platforms::ServiceRef;
use crate::plugins::Plugin;
use crate::{Error, Message};

/// One observation made by a [`RecordingPlugin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Load { plugin: String, service: String, blob: Vec<u8> },
    Start { plugin: String, service: String, text: String },
    End { plugin: String, service: String, text: String },
}

/// Shared, ordered log written by every recording plugin in a test.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: LogEvent) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// `(plugin, text)` for every completed delivery, in completion order.
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::End { plugin, text, .. } => Some((plugin, text)),
                _ => None,
            })
            .collect()
    }

    /// Texts one plugin finished handling, in order.
    pub fn seen_by(&self, plugin: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|(p, _)| p == plugin)
            .map(|(_, t)| t)
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterState {
    seen: u64,
}

/// Logs every call it receives and keeps a persisted message counter.
pub struct RecordingPlugin {
    name: String,
    log: DeliveryLog,
    state: CounterState,
    delay: Option<Duration>,
    panic_on: Option<String>,
    fail_save: bool,
    fail_load: bool,
}

impl RecordingPlugin {
    pub fn new(name: &str, log: DeliveryLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            state: CounterState::default(),
            delay: None,
            panic_on: None,
            fail_save: false,
            fail_load: false,
        }
    }

    /// Sleeps inside `message`, giving other tasks a chance to interleave.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking_on(mut self, text: &str) -> Self {
        self.panic_on = Some(text.to_string());
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self, _bot: &Bot, service: &ServiceRef, blob: &[u8]) -> Result<(), Error> {
        self.log.record(LogEvent::Load {
            plugin: self.name.clone(),
            service: service.name().to_string(),
            blob: blob.to_vec(),
        });
        if self.fail_load {
            return Err(Error::Plugin {
                plugin: self.name.clone(),
                reason: "refusing to load".into(),
            });
        }
        self.state = if blob.is_empty() {
            CounterState::default()
        } else {
            serde_json::from_slice(blob)?
        };
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>, Error> {
        if self.fail_save {
            return Err(Error::Platform(format!("{} refuses to save", self.name)));
        }
        Ok(serde_json::to_vec(&self.state)?)
    }

    fn help(&self, _bot: &Bot, service: &ServiceRef) -> Vec<String> {
        vec![format!("{}{} - records messages", service.command_prefix(), self.name)]
    }

    async fn message(&mut self, _bot: &Bot, service: &ServiceRef, message: &Message) {
        self.log.record(LogEvent::Start {
            plugin: self.name.clone(),
            service: service.name().to_string(),
            text: message.message.clone(),
        });
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.panic_on.as_deref() == Some(message.message.as_str()) {
            panic!("{} blew up on '{}'", self.name, message.message);
        }
        self.state.seen += 1;
        self.log.record(LogEvent::End {
            plugin: self.name.clone(),
            service: service.name().to_string(),
            text: message.message.clone(),
        });
    }
}
