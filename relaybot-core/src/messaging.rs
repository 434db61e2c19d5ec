//! src/messaging.rs
//!
//! Reply helpers shared by plugins: route answers back along the path a
//! message arrived on, and surface failed actions to the user.

use tracing::warn;

use crate::platforms::Service;
use crate::{Error, Message};

/// Sends `text` back to wherever `message` came from.
///
/// Private messages are answered privately. Multi-line text is sent as one
/// message per line when the service can't carry newlines.
pub async fn reply(service: &dyn Service, message: &Message, text: &str) -> Result<(), Error> {
    if service.supports_multiline() || !text.contains('\n') {
        return send_one(service, message, text).await;
    }
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        send_one(service, message, line).await?;
    }
    Ok(())
}

/// Sends each line, joined into one message when the service allows it.
pub async fn reply_lines(service: &dyn Service, message: &Message, lines: &[String]) -> Result<(), Error> {
    if lines.is_empty() {
        return Ok(());
    }
    reply(service, message, &lines.join("\n")).await
}

/// Reports a failed action back to the user who triggered it.
///
/// Returns the original result so callers can keep propagating it. If the
/// report itself can't be delivered the failure is only logged.
pub async fn report_failure<T>(
    service: &dyn Service,
    message: &Message,
    action: &str,
    result: Result<T, Error>,
) -> Result<T, Error> {
    if let Err(e) = &result {
        let text = format!("Sorry, {} failed: {}", action, e);
        if let Err(send_err) = reply(service, message, &text).await {
            warn!(
                "[{}] could not report failed '{}' to {}: {}",
                service.name(),
                action,
                message.user_id,
                send_err
            );
        }
    }
    result
}

async fn send_one(service: &dyn Service, message: &Message, text: &str) -> Result<(), Error> {
    if service.is_private(message) {
        service.private_message(&message.user_id, text).await
    } else {
        service.send_message(&message.channel, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockService, ServiceAction};

    #[tokio::test]
    async fn public_reply_goes_to_channel() {
        let svc = MockService::new("mock", "Relay");
        let msg = Message::new("room1", "u1", "alice", "!ping");
        reply(&svc, &msg, "pong").await.unwrap();
        assert_eq!(
            svc.actions(),
            vec![ServiceAction::SendMessage { channel: "room1".into(), text: "pong".into() }]
        );
    }

    #[tokio::test]
    async fn private_reply_goes_to_user() {
        let svc = MockService::new("mock", "Relay").with_private_channel("dm");
        let msg = Message::new("dm", "u1", "alice", "ping");
        reply(&svc, &msg, "pong").await.unwrap();
        assert_eq!(
            svc.actions(),
            vec![ServiceAction::PrivateMessage { user_id: "u1".into(), text: "pong".into() }]
        );
    }

    #[tokio::test]
    async fn multiline_is_split_when_unsupported() {
        let svc = MockService::new("mock", "Relay").with_multiline(false);
        let msg = Message::new("room1", "u1", "alice", "!help");
        reply(&svc, &msg, "a\nb\n").await.unwrap();
        assert_eq!(svc.sent_texts(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failure_is_reported_to_triggering_channel() {
        let svc = MockService::new("mock", "Relay");
        let msg = Message::new("room1", "u1", "alice", "!ban u42");
        let res: Result<(), Error> = Err(Error::PermissionDenied("missing ban scope".into()));
        let out = report_failure(&svc, &msg, "ban", res).await;
        assert!(matches!(out, Err(Error::PermissionDenied(_))));
        assert_eq!(
            svc.sent_texts(),
            vec!["Sorry, ban failed: Permission denied: missing ban scope".to_string()]
        );
    }
}
