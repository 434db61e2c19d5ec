// src/plugins/help.rs

use async_trait::async_trait;
use tracing::warn;

use crate::bot::Bot;
use crate::commands::matches_command;
use crate::messaging::reply_lines;
use crate::platforms::ServiceRef;
use crate::plugins::Plugin;
use crate::{Error, Message};

/// Answers `help` with the help lines of every registered plugin.
#[derive(Debug, Default)]
pub struct HelpPlugin;

impl HelpPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn name(&self) -> &str {
        "help"
    }

    async fn load(&mut self, _bot: &Bot, _service: &ServiceRef, _blob: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }

    fn help(&self, _bot: &Bot, service: &ServiceRef) -> Vec<String> {
        vec![format!("{}help - Lists available commands.", service.command_prefix())]
    }

    async fn message(&mut self, bot: &Bot, service: &ServiceRef, message: &Message) {
        if !matches_command(service.as_ref(), message, "help") {
            return;
        }

        // We're mid-dispatch, so bot.help() skips us.
        let mut lines = bot.help(service);
        lines.extend(self.help(bot, service));
        lines.sort();
        lines.dedup();

        if let Err(e) = reply_lines(service.as_ref(), message, &lines).await {
            warn!("[{}] could not send help to {}: {}", service.name(), message.user_id, e);
        }
    }
}
