//! src/bot/snapshot.rs
//!
//! Loading and saving plugin state. Failures here are recorded and logged but
//! never stop the bot: a plugin that can't load runs from its defaults, and a
//! plugin that can't save keeps its last good blob in the snapshot.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use super::failures::{FailureStage, PluginFailure, panic_reason};
use super::{Bot, PluginSlot};
use crate::persistence::Snapshot;
use crate::Error;

impl Bot {
    /// Calls `load` on every plugin with its blob from `snapshot`, or an
    /// empty blob when the snapshot has no entry. Each plugin is loaded once
    /// per registered service.
    ///
    /// Returns the failures recorded during this call.
    pub async fn load_all(&self, snapshot: &Snapshot) -> Vec<PluginFailure> {
        let before = self.failures.total();
        for slot in &self.plugins {
            let blob = snapshot.get(&slot.name).unwrap_or(&[]);
            self.load_slot(slot, blob).await;
        }
        self.failures_since(before)
    }

    /// Collects `save` from every plugin.
    pub async fn save_all(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for slot in &self.plugins {
            if let Some(blob) = self.save_slot(slot).await {
                snapshot.insert(slot.name.clone(), blob);
            }
        }
        snapshot
    }

    /// Loads every plugin from the configured store. Without a store this is
    /// a no-op and plugins start from defaults when `run` begins.
    pub async fn restore(&self) -> Result<Vec<PluginFailure>, Error> {
        let Some(store) = self.store.as_ref() else {
            debug!("(Bot) restore: no snapshot store configured");
            return Ok(Vec::new());
        };
        let snapshot = store.load().await.map_err(|e| {
            error!("(Bot) could not read plugin state: {}", e);
            e
        })?;
        info!("(Bot) restoring {} plugin state(s)", snapshot.len());
        Ok(self.load_all(&snapshot).await)
    }

    /// Saves every plugin into the configured store.
    pub async fn save_to_store(&self) -> Result<(), Error> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let snapshot = self.save_all().await;
        store.save(&snapshot).await?;
        debug!("(Bot) saved {} plugin state(s)", snapshot.len());
        Ok(())
    }

    /// Gives every plugin that hasn't been loaded yet an empty blob.
    pub(crate) async fn load_pending(&self) {
        for slot in &self.plugins {
            if !slot.loaded.load(Ordering::SeqCst) {
                debug!("(Bot) '{}' has no stored state, loading defaults", slot.name);
                self.load_slot(slot, &[]).await;
            }
        }
    }

    async fn load_slot(&self, slot: &PluginSlot, blob: &[u8]) {
        slot.loaded.store(true, Ordering::SeqCst);
        *slot.last_blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(blob.to_vec());

        if self.services.is_empty() {
            // Nothing to attach to yet; the blob is kept so saving doesn't lose it.
            debug!("(Bot) '{}' not loaded, no services registered", slot.name);
            return;
        }

        let Ok(mut plugin) = slot.plugin.try_lock() else {
            self.record_failure(slot, None, FailureStage::Load, "plugin busy".into());
            return;
        };

        let mut accepted = false;
        for service_slot in &self.services {
            let service = &service_slot.service;
            let call = AssertUnwindSafe(plugin.load(self, service, blob)).catch_unwind();
            let reason = match self.bounded(call).await {
                Ok(Ok(Ok(()))) => {
                    accepted = true;
                    continue;
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(payload)) => panic_reason(payload),
                Err(elapsed) => self.timeout_reason(elapsed),
            };
            self.record_failure(slot, Some(service), FailureStage::Load, reason);
        }

        // Until the plugin accepts the blob, saving hands the blob back untouched.
        slot.applied.store(accepted, Ordering::SeqCst);
    }

    async fn save_slot(&self, slot: &PluginSlot) -> Option<Vec<u8>> {
        let last_good = || slot.last_blob.lock().unwrap_or_else(|p| p.into_inner()).clone();

        if !slot.applied.load(Ordering::SeqCst) {
            if let Some(blob) = last_good() {
                return Some(blob);
            }
        }

        let Ok(plugin) = slot.plugin.try_lock() else {
            warn!("(Bot) '{}' is busy, saving its last known state", slot.name);
            return last_good();
        };

        let reason = match std::panic::catch_unwind(AssertUnwindSafe(|| plugin.save())) {
            Ok(Ok(blob)) => {
                *slot.last_blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(blob.clone());
                return Some(blob);
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_reason(payload),
        };
        drop(plugin);

        self.record_failure(slot, None, FailureStage::Save, reason);
        last_good()
    }

    fn failures_since(&self, before: u64) -> Vec<PluginFailure> {
        let new = (self.failures.total() - before) as usize;
        let all = self.failures.snapshot();
        let skip = all.len().saturating_sub(new);
        all.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::persistence::MockSnapshotStore;
    use crate::test_utils::{DeliveryLog, MockService, RecordingPlugin};

    fn bot_with_counter(log: &DeliveryLog) -> Bot {
        let mut bot = Bot::default();
        bot.add_service(Arc::new(MockService::new("mock", "Relay"))).unwrap();
        bot.add_plugin("counter", Box::new(RecordingPlugin::new("counter", log.clone())))
            .unwrap();
        bot
    }

    #[tokio::test]
    async fn restore_reads_the_store_once() {
        let mut store = MockSnapshotStore::new();
        store.expect_load().times(1).returning(|| {
            let mut snap = Snapshot::new();
            snap.insert("counter", br#"{"seen":7}"#.to_vec());
            Ok(snap)
        });

        let log = DeliveryLog::new();
        let mut bot = bot_with_counter(&log);
        bot.set_store(Arc::new(store));

        let failures = bot.restore().await.unwrap();
        assert!(failures.is_empty());
        assert_eq!(bot.save_all().await.get("counter"), Some(&br#"{"seen":7}"#[..]));
    }

    #[tokio::test]
    async fn unreadable_store_is_reported_to_the_caller() {
        let mut store = MockSnapshotStore::new();
        store
            .expect_load()
            .returning(|| Err(Error::Parse("corrupt state".into())));

        let log = DeliveryLog::new();
        let mut bot = bot_with_counter(&log);
        bot.set_store(Arc::new(store));

        assert!(matches!(bot.restore().await, Err(Error::Parse(_))));
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn save_to_store_hands_over_every_blob() {
        let mut store = MockSnapshotStore::new();
        store
            .expect_save()
            .withf(|snapshot| snapshot.get("counter") == Some(&br#"{"seen":0}"#[..]))
            .times(1)
            .returning(|_| Ok(()));

        let log = DeliveryLog::new();
        let mut bot = bot_with_counter(&log);
        bot.set_store(Arc::new(store));

        bot.load_all(&Snapshot::new()).await;
        bot.save_to_store().await.unwrap();
    }

    #[tokio::test]
    async fn without_store_restore_and_save_are_no_ops() {
        let log = DeliveryLog::new();
        let bot = bot_with_counter(&log);
        assert!(bot.restore().await.unwrap().is_empty());
        bot.save_to_store().await.unwrap();
    }
}
