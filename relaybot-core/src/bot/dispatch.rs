//! src/bot/dispatch.rs
//!
//! Opening services, the per-service forwarder tasks (fan-in), and the
//! single dispatch loop that hands each message to every plugin in turn.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::error::Elapsed;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::failures::{FailureStage, PluginFailure, panic_reason};
use super::{Bot, PluginSlot};
use crate::platforms::{ServiceRef, ServiceState};
use crate::{Error, Message};

/// A message together with the service it arrived on.
pub(crate) struct Envelope {
    pub(crate) service: ServiceRef,
    pub(crate) message: Message,
}

/// Outcome of [`Bot::open`]. A failed service simply doesn't feed the queue.
#[derive(Debug, Default)]
pub struct OpenReport {
    pub opened: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl OpenReport {
    pub fn all_opened(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages delivered to the plugin set.
    pub dispatched: u64,
    /// Messages dropped because the service recognised them as its own.
    pub suppressed: u64,
}

impl Bot {
    /// Opens every registered service and starts one reader task per stream.
    ///
    /// A service that fails to open is logged and reported but doesn't stop
    /// the others from starting.
    pub async fn open(&self) -> Result<OpenReport, Error> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(Error::BotAlreadyOpen);
        }

        let (queue_tx, queue_rx) = mpsc::channel::<Envelope>(self.config.queue_capacity.max(1));
        let mut report = OpenReport::default();

        // Handshakes run concurrently so a slow backend doesn't hold up the rest.
        let results = join_all(self.services.iter().map(|slot| slot.service.open())).await;

        for (slot, result) in self.services.iter().zip(results) {
            let name = slot.service.name().to_string();
            match result {
                Ok(inbound) => {
                    slot.set_state(ServiceState::Open);
                    info!("[{}] opened as '{}'", name, slot.service.user_name());
                    let handle = tokio::spawn(forward(
                        Arc::clone(&slot.service),
                        Arc::clone(&slot.state),
                        inbound,
                        queue_tx.clone(),
                        self.shutdown_rx.clone(),
                    ));
                    self.forwarders
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .push(handle);
                    report.opened.push(name);
                }
                Err(e) => {
                    error!("[{}] open failed: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }

        // Only the forwarders hold senders now, so the queue closes once
        // every one of them has stopped.
        drop(queue_tx);
        *self.inbound.lock().await = Some(queue_rx);

        info!(
            "(Bot) {} of {} service(s) open",
            report.opened.len(),
            self.services.len()
        );
        Ok(report)
    }

    /// Runs the dispatch loop until the merged queue is closed and drained.
    ///
    /// The queue closes when every service stream has ended or after
    /// [`Bot::shutdown`]. Plugins that were never loaded get an empty blob
    /// first. With a store configured, state is saved periodically and once
    /// more on the way out.
    pub async fn run(&self) -> Result<RunSummary, Error> {
        let mut inbound = self.inbound.lock().await.take().ok_or(Error::BotNotOpen)?;

        self.load_pending().await;

        let autosave = self
            .config
            .autosave_interval()
            .filter(|_| self.store.is_some());
        let period = autosave.unwrap_or(Duration::from_secs(3600));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("(Bot) dispatch loop started with {} plugin(s)", self.plugins.len());
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                maybe_env = inbound.recv() => match maybe_env {
                    Some(env) => {
                        if self.dispatch(env).await {
                            summary.dispatched += 1;
                        } else {
                            summary.suppressed += 1;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick(), if autosave.is_some() => {
                    if let Err(e) = self.save_to_store().await {
                        error!("(Bot) autosave failed: {}", e);
                    }
                }
            }
        }

        let handles = std::mem::take(&mut *self.forwarders.lock().unwrap_or_else(|p| p.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("(Bot) forwarder task ended abnormally: {}", e);
            }
        }

        info!(
            "(Bot) dispatch loop finished: {} dispatched, {} suppressed",
            summary.dispatched, summary.suppressed
        );

        if self.store.is_some() {
            self.save_to_store().await?;
        }
        Ok(summary)
    }

    /// Delivers one message to every plugin in order. Returns `false` when
    /// the message was the bot's own echo and nobody saw it.
    async fn dispatch(&self, env: Envelope) -> bool {
        let Envelope { service, message } = env;

        if service.is_me(&message) {
            trace!("[{}] suppressing own message in {}", service.name(), message.channel);
            return false;
        }

        for slot in &self.plugins {
            let mut plugin = slot.plugin.lock().await;
            let call = AssertUnwindSafe(plugin.message(self, &service, &message)).catch_unwind();
            match self.bounded(call).await {
                // Save the plugin's own state from now on.
                Ok(Ok(())) => slot.applied.store(true, Ordering::SeqCst),
                Ok(Err(payload)) => {
                    self.record_failure(slot, Some(&service), FailureStage::Message, panic_reason(payload));
                }
                Err(elapsed) => {
                    self.record_failure(slot, Some(&service), FailureStage::Message, self.timeout_reason(elapsed));
                }
            }
        }
        true
    }

    /// Applies the configured per-call plugin timeout, if any.
    pub(crate) async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        match self.config.plugin_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut).await,
            None => Ok(fut.await),
        }
    }

    pub(crate) fn timeout_reason(&self, elapsed: Elapsed) -> String {
        format!(
            "{} after {}ms",
            Error::from(elapsed),
            self.config.plugin_timeout_ms.unwrap_or_default()
        )
    }

    pub(crate) fn record_failure(
        &self,
        slot: &PluginSlot,
        service: Option<&ServiceRef>,
        stage: FailureStage,
        reason: String,
    ) {
        let service = service.map(|s| s.name().to_string());
        error!(
            "(Bot) plugin '{}' {:?} failure on {}: {}",
            slot.name,
            stage,
            service.as_deref().unwrap_or("-"),
            reason
        );
        self.failures.record(PluginFailure {
            plugin: slot.name.clone(),
            service,
            stage,
            reason,
            at: Utc::now(),
        });
    }
}

/// Reads one service's stream into the shared queue until the stream ends,
/// the queue goes away, or shutdown is requested.
async fn forward(
    service: ServiceRef,
    state: Arc<Mutex<ServiceState>>,
    mut inbound: mpsc::Receiver<Message>,
    queue: mpsc::Sender<Envelope>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let name = service.name().to_string();
    debug!("[{}] forwarder started", name);

    loop {
        tokio::select! {
            maybe_msg = inbound.recv() => match maybe_msg {
                Some(message) => {
                    let env = Envelope { service: Arc::clone(&service), message };
                    if queue.send(env).await.is_err() {
                        warn!("[{}] dispatch queue closed, dropping stream", name);
                        break;
                    }
                }
                None => {
                    info!("[{}] stream closed by service", name);
                    break;
                }
            },
            _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                info!("[{}] forwarder stopping on shutdown", name);
                break;
            }
        }
    }

    *state.lock().unwrap_or_else(|p| p.into_inner()) = ServiceState::Closed;
}
