//! src/plugins/command.rs
//!
//! A generic command router: commands are registered by name with a help
//! entry and a handler, and the plugin takes care of prefix parsing,
//! moderator-only checks and reporting handler errors back to the user.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::commands::{Command, parse_command};
use crate::messaging::{reply, report_failure};
use crate::platforms::ServiceRef;
use crate::plugins::Plugin;
use crate::{Error, Message};

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        bot: &Bot,
        service: &ServiceRef,
        message: &Message,
        command: &Command,
    ) -> Result<(), Error>;
}

/// Help entry shown as `<prefix><name> <args> - <summary>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandHelp {
    pub args: String,
    pub summary: String,
}

impl CommandHelp {
    pub fn new(args: &str, summary: &str) -> Self {
        Self {
            args: args.to_string(),
            summary: summary.to_string(),
        }
    }
}

struct CommandEntry {
    name: String,
    help: CommandHelp,
    moderator_only: bool,
    handler: Box<dyn CommandHandler>,
}

pub struct CommandPlugin {
    name: String,
    commands: Vec<CommandEntry>,
}

impl CommandPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn add_command(
        &mut self,
        name: &str,
        help: CommandHelp,
        handler: Box<dyn CommandHandler>,
    ) -> Result<(), Error> {
        self.insert(name, help, handler, false)
    }

    /// Like `add_command`, but only moderators may invoke it.
    pub fn add_moderator_command(
        &mut self,
        name: &str,
        help: CommandHelp,
        handler: Box<dyn CommandHandler>,
    ) -> Result<(), Error> {
        self.insert(name, help, handler, true)
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    fn insert(
        &mut self,
        name: &str,
        help: CommandHelp,
        handler: Box<dyn CommandHandler>,
        moderator_only: bool,
    ) -> Result<(), Error> {
        let name = name.to_lowercase();
        if self.commands.iter().any(|c| c.name == name) {
            return Err(Error::DuplicateCommand(name));
        }
        self.commands.push(CommandEntry {
            name,
            help,
            moderator_only,
            handler,
        });
        Ok(())
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self, _bot: &Bot, _service: &ServiceRef, _blob: &[u8]) -> Result<(), Error> {
        // Stateless.
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }

    fn help(&self, _bot: &Bot, service: &ServiceRef) -> Vec<String> {
        let prefix = service.command_prefix();
        self.commands
            .iter()
            .map(|c| {
                if c.help.args.is_empty() {
                    format!("{}{} - {}", prefix, c.name, c.help.summary)
                } else {
                    format!("{}{} {} - {}", prefix, c.name, c.help.args, c.help.summary)
                }
            })
            .collect()
    }

    async fn message(&mut self, bot: &Bot, service: &ServiceRef, message: &Message) {
        let Some(command) = parse_command(service.as_ref(), message) else {
            return;
        };
        let Some(entry) = self.commands.iter().find(|c| c.name == command.name) else {
            return;
        };

        if entry.moderator_only && !message.is_moderator {
            debug!(
                "[{}] {} tried moderator command '{}'",
                service.name(),
                message.user_id,
                entry.name
            );
            let text = format!("Sorry, {} is for moderators only.", entry.name);
            if let Err(e) = reply(service.as_ref(), message, &text).await {
                warn!("[{}] could not send refusal: {}", service.name(), e);
            }
            return;
        }

        let result = entry.handler.handle(bot, service, message, &command).await;
        let _ = report_failure(service.as_ref(), message, &entry.name, result).await;
    }
}
