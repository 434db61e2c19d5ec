//! src/bot/mod.rs
//!
//! The `Bot` owns every registered service and plugin. Registration needs
//! `&mut Bot`; once the bot is shared to run, both registries are read-only.

mod dispatch;
mod failures;
mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::persistence::SnapshotStore;
use crate::platforms::{ServiceRef, ServiceState};
use crate::plugins::Plugin;
use crate::Error;

pub use dispatch::{OpenReport, RunSummary};
pub use failures::{FailureStage, PluginFailure};

use dispatch::Envelope;
use failures::FailureLog;

pub(crate) struct ServiceSlot {
    pub(crate) service: ServiceRef,
    pub(crate) state: Arc<Mutex<ServiceState>>,
}

impl ServiceSlot {
    pub(crate) fn set_state(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub(crate) fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub(crate) struct PluginSlot {
    pub(crate) name: String,
    /// Only ever contended when a plugin calls back into the bot while it is
    /// itself being dispatched to.
    pub(crate) plugin: AsyncMutex<Box<dyn Plugin>>,
    /// Last blob known to represent this plugin's state (loaded or saved).
    pub(crate) last_blob: Mutex<Option<Vec<u8>>>,
    /// `load_all` (or the pre-run default load) has handled this plugin.
    pub(crate) loaded: AtomicBool,
    /// The plugin holds state worth saving: a `load` succeeded or it has
    /// handled a message since.
    pub(crate) applied: AtomicBool,
}

pub struct Bot {
    config: BotConfig,
    services: Vec<ServiceSlot>,
    plugins: Vec<PluginSlot>,
    store: Option<Arc<dyn SnapshotStore>>,
    failures: FailureLog,

    /// Merged inbound queue, filled by `open` and consumed by `run`.
    inbound: AsyncMutex<Option<mpsc::Receiver<Envelope>>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    opened: AtomicBool,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for Bot {
    fn default() -> Self {
        Self::new(BotConfig::default())
    }
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let failures = FailureLog::new(config.failure_history);
        Self {
            config,
            services: Vec::new(),
            plugins: Vec::new(),
            store: None,
            failures,
            inbound: AsyncMutex::new(None),
            forwarders: Mutex::new(Vec::new()),
            opened: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Where `restore`/`save_to_store` and autosave keep plugin state.
    pub fn set_store(&mut self, store: Arc<dyn SnapshotStore>) {
        self.store = Some(store);
    }

    /// Registers a service under its `name()`.
    pub fn add_service(&mut self, service: ServiceRef) -> Result<(), Error> {
        let name = service.name().to_string();
        if self.services.iter().any(|s| s.service.name() == name) {
            return Err(Error::DuplicateService(name));
        }
        info!("(Bot) registered service '{}'", name);
        self.services.push(ServiceSlot {
            service,
            state: Arc::new(Mutex::new(ServiceState::Unopened)),
        });
        Ok(())
    }

    /// Registers a plugin. Plugins are dispatched to in registration order.
    pub fn add_plugin(&mut self, name: &str, plugin: Box<dyn Plugin>) -> Result<(), Error> {
        if self.plugins.iter().any(|p| p.name == name) {
            return Err(Error::DuplicatePlugin(name.to_string()));
        }
        if plugin.name() != name {
            debug!("(Bot) plugin '{}' registered under key '{}'", plugin.name(), name);
        }
        info!("(Bot) registered plugin '{}'", name);
        self.plugins.push(PluginSlot {
            name: name.to_string(),
            plugin: AsyncMutex::new(plugin),
            last_blob: Mutex::new(None),
            loaded: AtomicBool::new(false),
            applied: AtomicBool::new(false),
        });
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<ServiceRef> {
        self.services
            .iter()
            .find(|s| s.service.name() == name)
            .map(|s| Arc::clone(&s.service))
    }

    pub fn services(&self) -> Vec<ServiceRef> {
        self.services.iter().map(|s| Arc::clone(&s.service)).collect()
    }

    /// Lifecycle of a service as the bot has observed it.
    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.services
            .iter()
            .find(|s| s.service.name() == name)
            .map(|s| s.state())
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name.clone()).collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name == name)
    }

    /// Aggregated help from every plugin, in registration order.
    ///
    /// A plugin that is handling a message right now (typically the caller)
    /// is skipped; it should add its own lines.
    pub fn help(&self, service: &ServiceRef) -> Vec<String> {
        let mut lines = Vec::new();
        for slot in &self.plugins {
            match slot.plugin.try_lock() {
                Ok(plugin) => lines.extend(plugin.help(self, service)),
                Err(_) => debug!("(Bot) help: '{}' is busy, skipping", slot.name),
            }
        }
        lines
    }

    /// Most recent plugin failures, oldest first.
    pub fn failures(&self) -> Vec<PluginFailure> {
        self.failures.snapshot()
    }

    /// Failures recorded since start, including ones aged out of the history.
    pub fn failure_count(&self) -> u64 {
        self.failures.total()
    }

    /// Asks every service reader to stop. `run` drains whatever is already
    /// queued and then returns.
    pub fn shutdown(&self) {
        info!("(Bot) shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}
