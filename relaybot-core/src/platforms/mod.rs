// File: src/platforms/mod.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::{Error, Message};

pub mod console;

/// Lifecycle of one service instance, as observed by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unopened,
    Open,
    /// Terminal. A new instance is required to reconnect.
    Closed,
}

/// Connector to one chat backend.
///
/// `open` hands out the inbound stream exactly once; the service closes that
/// stream when its connection ends. Every action returns the backend's
/// rejection as an error and must not block indefinitely.
#[async_trait]
pub trait Service: Send + Sync {
    /// Backend kind, also the key the bot registers the service under.
    fn name(&self) -> &str;

    /// The bot's own display name on this backend.
    fn user_name(&self) -> &str;

    /// Establishes the connection and returns the inbound message stream.
    ///
    /// Fails with [`Error::AlreadyJoined`] if this instance already produced a stream.
    async fn open(&self) -> Result<Receiver<Message>, Error>;

    /// True when `message` is an echo of something the bot itself sent.
    fn is_me(&self, message: &Message) -> bool;

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error>;
    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), Error>;
    async fn ban_user(&self, channel: &str, user_id: &str, duration: Duration) -> Result<(), Error>;
    async fn unban_user(&self, channel: &str, user_id: &str) -> Result<(), Error>;
    async fn set_playing(&self, game: &str) -> Result<(), Error>;
    async fn join(&self, join: &str) -> Result<(), Error>;
    async fn typing(&self, channel: &str) -> Result<(), Error>;
    async fn private_message(&self, user_id: &str, message: &str) -> Result<(), Error>;

    /// Direct message vs. channel message.
    fn is_private(&self, message: &Message) -> bool;
    fn supports_multiline(&self) -> bool;
    fn command_prefix(&self) -> &str;
}

/// Services are shared between the bot, its forwarder tasks and plugins.
pub type ServiceRef = Arc<dyn Service>;

/// Enforces `Unopened -> Open -> Closed` for a service implementation.
///
/// Adapters call [`claim`](Self::claim) at the top of `open`, and
/// [`release`](Self::release) if the handshake then fails.
#[derive(Debug)]
pub struct ServiceLifecycle {
    state: Mutex<ServiceState>,
}

impl Default for ServiceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Unopened),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn claim(&self) -> Result<(), Error> {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *guard {
            ServiceState::Unopened => {
                *guard = ServiceState::Open;
                Ok(())
            }
            ServiceState::Open | ServiceState::Closed => Err(Error::AlreadyJoined),
        }
    }

    /// Handshake failed: back to `Unopened` so a later `open` may retry.
    pub fn release(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *guard == ServiceState::Open {
            *guard = ServiceState::Unopened;
        }
    }

    pub fn close(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *guard = ServiceState::Closed;
    }
}
