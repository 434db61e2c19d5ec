//! src/commands.rs
//!
//! Central command recognition so plugins don't each re-implement prefix logic.
//!
//! A message is a command when its text starts with the service's command
//! prefix, or with a mention of the bot's own user name followed by a
//! separator (`@Relay help`, `Relay: help`, `relay, help`). In private
//! messages the whole text is treated as a command.

use crate::platforms::Service;
use crate::Message;

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercased command word.
    pub name: String,
    /// Whitespace-separated arguments, original casing.
    pub args: Vec<String>,
    /// Everything after the command word, trimmed.
    pub rest: String,
}

const MENTION_SEPARATORS: [char; 2] = [':', ','];

/// Returns the candidate command text with the prefix or mention stripped,
/// or `None` when the message is not a command.
pub fn command_text<'a>(service: &dyn Service, message: &'a Message) -> Option<&'a str> {
    let text = message.message.trim_start();

    let prefix = service.command_prefix();
    if !prefix.is_empty() {
        if let Some(rest) = strip_prefix_ignore_case(text, prefix) {
            return non_empty(rest);
        }
    }

    if let Some(rest) = strip_mention(text, service.user_name()) {
        return non_empty(rest);
    }

    if service.is_private(message) {
        return non_empty(text);
    }

    None
}

/// Splits a command message into its name and arguments.
pub fn parse_command(service: &dyn Service, message: &Message) -> Option<Command> {
    let text = command_text(service, message)?;
    let mut parts = text.splitn(2, char::is_whitespace);
    let name = parts.next()?.to_lowercase();
    let rest = parts.next().unwrap_or("").trim().to_string();
    let args = rest.split_whitespace().map(|s| s.to_string()).collect();
    Some(Command { name, args, rest })
}

/// True if `message` invokes the command `name` (case-insensitive).
pub fn matches_command(service: &dyn Service, message: &Message, name: &str) -> bool {
    parse_command(service, message)
        .map(|cmd| cmd.name.eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s) }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn strip_mention<'a>(text: &'a str, user_name: &str) -> Option<&'a str> {
    if user_name.is_empty() {
        return None;
    }
    let (text, at_sign) = match text.strip_prefix('@') {
        Some(t) => (t, true),
        None => (text, false),
    };
    let rest = strip_prefix_ignore_case(text, user_name)?;
    match rest.chars().next() {
        Some(c) if MENTION_SEPARATORS.contains(&c) => Some(&rest[c.len_utf8()..]),
        Some(c) if c.is_whitespace() => Some(rest),
        // "@Relay" on its own is a mention with no command.
        None if at_sign => Some(rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;

    fn msg(text: &str) -> Message {
        Message::new("room1", "u1", "alice", text)
    }

    #[test]
    fn prefix_is_stripped() {
        let svc = MockService::new("mock", "Relay");
        assert_eq!(command_text(&svc, &msg("!help me")), Some("help me"));
        assert_eq!(command_text(&svc, &msg("   !ping")), Some("ping"));
        assert_eq!(command_text(&svc, &msg("hello")), None);
        assert_eq!(command_text(&svc, &msg("!")), None);
    }

    #[test]
    fn multi_char_prefix_is_case_insensitive() {
        let svc = MockService::new("mock", "Relay").with_prefix("bot.");
        assert_eq!(command_text(&svc, &msg("BOT.trivia start")), Some("trivia start"));
        assert_eq!(command_text(&svc, &msg("!trivia")), None);
    }

    #[test]
    fn mentions_are_commands() {
        let svc = MockService::new("mock", "Relay");
        assert_eq!(command_text(&svc, &msg("@Relay help")), Some("help"));
        assert_eq!(command_text(&svc, &msg("relay: help")), Some("help"));
        assert_eq!(command_text(&svc, &msg("Relay, stats now")), Some("stats now"));
        assert_eq!(command_text(&svc, &msg("Relaying is fun")), None);
        assert_eq!(command_text(&svc, &msg("@Relay")), None);
    }

    #[test]
    fn private_messages_need_no_prefix() {
        let svc = MockService::new("mock", "Relay").with_private_channel("dm-1");
        let dm = Message::new("dm-1", "u1", "alice", "help");
        assert_eq!(command_text(&svc, &dm), Some("help"));
        assert_eq!(command_text(&svc, &msg("help")), None);
    }

    #[test]
    fn parse_splits_name_and_args() {
        let svc = MockService::new("mock", "Relay");
        let cmd = parse_command(&svc, &msg("!Ban  u42   60")).unwrap();
        assert_eq!(cmd.name, "ban");
        assert_eq!(cmd.args, vec!["u42".to_string(), "60".to_string()]);
        assert_eq!(cmd.rest, "u42   60");

        let bare = parse_command(&svc, &msg("!help")).unwrap();
        assert!(bare.args.is_empty());
        assert_eq!(bare.rest, "");
    }

    #[test]
    fn matches_command_ignores_case() {
        let svc = MockService::new("mock", "Relay");
        assert!(matches_command(&svc, &msg("!HELP"), "help"));
        assert!(!matches_command(&svc, &msg("!helpme"), "help"));
        assert!(!matches_command(&svc, &msg("help"), "help"));
    }
}
