// tests/command_plugin_tests.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use relaybot_core::commands::Command;
use relaybot_core::messaging::reply;
use relaybot_core::plugins::{CommandHandler, CommandHelp, CommandPlugin, HelpPlugin};
use relaybot_core::test_utils::{MockService, ServiceAction};
use relaybot_core::{Bot, BotConfig, Error, Message, ServiceRef};

struct Pong;

#[async_trait]
impl CommandHandler for Pong {
    async fn handle(&self, _bot: &Bot, service: &ServiceRef, message: &Message, _command: &Command) -> Result<(), Error> {
        reply(service.as_ref(), message, "pong").await
    }
}

struct Roll;

#[async_trait]
impl CommandHandler for Roll {
    async fn handle(&self, _bot: &Bot, service: &ServiceRef, message: &Message, command: &Command) -> Result<(), Error> {
        let sides: u32 = command
            .args
            .first()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Parse("sides must be a number".into()))?;
        reply(service.as_ref(), message, &format!("rolling a d{}", sides)).await
    }
}

struct Ban;

#[async_trait]
impl CommandHandler for Ban {
    async fn handle(&self, _bot: &Bot, service: &ServiceRef, message: &Message, command: &Command) -> Result<(), Error> {
        let target = command
            .args
            .first()
            .ok_or_else(|| Error::Parse("usage: ban <user>".into()))?;
        service
            .ban_user(&message.channel, target, Duration::from_secs(600))
            .await?;
        reply(service.as_ref(), message, &format!("banned {}", target)).await
    }
}

fn tools() -> CommandPlugin {
    let mut plugin = CommandPlugin::new("tools");
    plugin
        .add_command("ping", CommandHelp::new("", "Replies with pong."), Box::new(Pong))
        .unwrap();
    plugin
        .add_command("roll", CommandHelp::new("<sides>", "Rolls a die."), Box::new(Roll))
        .unwrap();
    plugin
        .add_moderator_command("ban", CommandHelp::new("<user>", "Bans a user."), Box::new(Ban))
        .unwrap();
    plugin
}

fn user(text: &str) -> Message {
    Message::new("room", "u1", "alice", text)
}

/// Runs `script` through a bot with the tools and help plugins and returns
/// the service so its actions can be inspected.
async fn run_script(service: MockService, script: Vec<Message>) -> Arc<MockService> {
    let svc = Arc::new(service.with_script(script).closing_after_script());
    let mut bot = Bot::new(BotConfig {
        autosave_secs: None,
        ..BotConfig::default()
    });
    bot.add_service(svc.clone()).unwrap();
    bot.add_plugin("tools", Box::new(tools())).unwrap();
    bot.add_plugin("help", Box::new(HelpPlugin::new())).unwrap();

    bot.open().await.unwrap();
    timeout(Duration::from_secs(5), bot.run()).await.unwrap().unwrap();
    assert!(bot.failures().is_empty());
    svc
}

#[tokio::test]
async fn commands_are_recognised_by_prefix_and_mention() {
    let svc = run_script(
        MockService::new("mock", "Relay"),
        vec![
            user("!ping"),
            user("!PING"),
            user("@Relay ping"),
            user("relay: ping"),
            user("ping"),
            user("!pingpong"),
            user("!unknown"),
        ],
    )
    .await;
    assert_eq!(svc.sent_texts(), vec!["pong"; 4]);
}

#[tokio::test]
async fn private_messages_need_no_prefix_and_are_answered_privately() {
    let svc = run_script(
        MockService::new("mock", "Relay").with_private_channel("dm-u1"),
        vec![Message::new("dm-u1", "u1", "alice", "ping")],
    )
    .await;
    assert_eq!(
        svc.actions(),
        vec![ServiceAction::PrivateMessage {
            user_id: "u1".into(),
            text: "pong".into()
        }]
    );
}

#[tokio::test]
async fn help_lists_every_command_in_one_message() {
    let svc = run_script(MockService::new("mock", "Relay"), vec![user("!help")]).await;
    assert_eq!(
        svc.sent_texts(),
        vec![
            "!ban <user> - Bans a user.\n\
             !help - Lists available commands.\n\
             !ping - Replies with pong.\n\
             !roll <sides> - Rolls a die."
                .to_string()
        ]
    );
}

#[tokio::test]
async fn help_is_split_per_line_without_multiline_support() {
    let svc = run_script(
        MockService::new("mock", "Relay")
            .with_prefix(".")
            .with_multiline(false),
        vec![user(".help")],
    )
    .await;
    assert_eq!(
        svc.sent_texts(),
        vec![
            ".ban <user> - Bans a user.".to_string(),
            ".help - Lists available commands.".to_string(),
            ".ping - Replies with pong.".to_string(),
            ".roll <sides> - Rolls a die.".to_string(),
        ]
    );
}

#[tokio::test]
async fn moderator_commands_check_the_sender() {
    let svc = run_script(
        MockService::new("mock", "Relay"),
        vec![user("!ban bob"), user("!ban carol").as_moderator()],
    )
    .await;
    assert_eq!(
        svc.actions(),
        vec![
            ServiceAction::SendMessage {
                channel: "room".into(),
                text: "Sorry, ban is for moderators only.".into()
            },
            ServiceAction::BanUser {
                channel: "room".into(),
                user_id: "carol".into(),
                duration: Duration::from_secs(600)
            },
            ServiceAction::SendMessage {
                channel: "room".into(),
                text: "banned carol".into()
            },
        ]
    );
}

#[tokio::test]
async fn handler_errors_are_reported_to_the_user() {
    let svc = run_script(
        MockService::new("mock", "Relay")
            .failing("ban_user", || Error::PermissionDenied("missing moderator rights".into())),
        vec![
            user("!roll many"),
            user("!ban dave").as_moderator(),
            user("!roll 20"),
        ],
    )
    .await;
    assert_eq!(
        svc.sent_texts(),
        vec![
            "Sorry, roll failed: Parse error: sides must be a number".to_string(),
            "Sorry, ban failed: Permission denied: missing moderator rights".to_string(),
            "rolling a d20".to_string(),
        ]
    );
}

#[test]
fn duplicate_commands_are_rejected_case_insensitively() {
    let mut plugin = tools();
    let err = plugin
        .add_command("PING", CommandHelp::new("", "Another pong."), Box::new(Pong))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateCommand(ref n) if n == "ping"));
    assert_eq!(plugin.command_names(), vec!["ping", "roll", "ban"]);
}
