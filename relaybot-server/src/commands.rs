// relaybot-server/src/commands.rs
//
// The small command set the binary ships with.

use async_trait::async_trait;

use relaybot_common::Error;
use relaybot_core::commands::Command;
use relaybot_core::messaging::reply;
use relaybot_core::plugins::{CommandHandler, CommandHelp, CommandPlugin};
use relaybot_core::{Bot, Message, Service, ServiceRef};

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn handle(
        &self,
        _bot: &Bot,
        service: &ServiceRef,
        message: &Message,
        _command: &Command,
    ) -> Result<(), Error> {
        reply(service.as_ref(), message, "pong").await
    }
}

pub struct AboutCommand;

#[async_trait]
impl CommandHandler for AboutCommand {
    async fn handle(
        &self,
        bot: &Bot,
        service: &ServiceRef,
        message: &Message,
        _command: &Command,
    ) -> Result<(), Error> {
        let text = format!(
            "{} v{} with plugins: {}",
            service.user_name(),
            env!("CARGO_PKG_VERSION"),
            bot.plugin_names().join(", ")
        );
        reply(service.as_ref(), message, &text).await
    }
}

/// Service states and the plugin failure count.
pub struct StatusCommand;

#[async_trait]
impl CommandHandler for StatusCommand {
    async fn handle(
        &self,
        bot: &Bot,
        service: &ServiceRef,
        message: &Message,
        _command: &Command,
    ) -> Result<(), Error> {
        let mut lines: Vec<String> = bot
            .services()
            .iter()
            .map(|s| {
                let state = bot
                    .service_state(s.name())
                    .map(|st| format!("{:?}", st))
                    .unwrap_or_else(|| "unknown".to_string());
                format!("{}: {}", s.name(), state)
            })
            .collect();
        lines.push(format!("plugin failures: {}", bot.failure_count()));
        if let Some(last) = bot.failures().last() {
            lines.push(format!("last: {} ({:?}) {}", last.plugin, last.stage, last.reason));
        }
        reply(service.as_ref(), message, &lines.join("\n")).await
    }
}

pub fn builtin_commands() -> Result<CommandPlugin, Error> {
    let mut plugin = CommandPlugin::new("builtin");
    plugin.add_command("ping", CommandHelp::new("", "Replies with pong."), Box::new(PingCommand))?;
    plugin.add_command(
        "about",
        CommandHelp::new("", "Shows the bot version and loaded plugins."),
        Box::new(AboutCommand),
    )?;
    plugin.add_moderator_command(
        "status",
        CommandHelp::new("", "Shows service states and plugin failures."),
        Box::new(StatusCommand),
    )?;
    Ok(plugin)
}
