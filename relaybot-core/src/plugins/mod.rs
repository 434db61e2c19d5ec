//! src/plugins/mod.rs
//!
//! The plugin contract plus the built-in command router and help responder.

use async_trait::async_trait;

use crate::bot::Bot;
use crate::platforms::ServiceRef;
use crate::{Error, Message};

pub mod command;
pub mod help;

pub use command::{CommandHandler, CommandHelp, CommandPlugin};
pub use help::HelpPlugin;

/// A named, independently persisted unit of behavior.
///
/// The bot delivers messages to plugins one at a time, so state reachable
/// through `&mut self` needs no locking of its own.
#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Restores state from `blob`. An empty blob means "start from defaults".
    ///
    /// Called once per (plugin, service) pair before the first message.
    async fn load(&mut self, bot: &Bot, service: &ServiceRef, blob: &[u8]) -> Result<(), Error>;

    /// Serializes the current state. `save` right after `load(blob)` must
    /// restore to the same behavior as `blob`.
    fn save(&self) -> Result<Vec<u8>, Error>;

    fn help(&self, bot: &Bot, service: &ServiceRef) -> Vec<String>;

    async fn message(&mut self, bot: &Bot, service: &ServiceRef, message: &Message);
}
