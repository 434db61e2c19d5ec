// relaybot-common/src/models/message.rs
use serde::{Deserialize, Serialize};

/// One inbound chat event, as produced by a service adapter.
///
/// Values are handed to plugins by shared reference and never mutated after
/// the adapter builds them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque channel/room identifier on the originating service.
    pub channel: String,
    pub user_name: String,
    /// Stable sender identity, used for moderation and self-detection.
    pub user_id: String,
    #[serde(default)]
    pub user_avatar: String,
    pub message: String,
    /// Backend-specific id, used to delete or target the message.
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub is_moderator: bool,
}

impl Message {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_name: user_name.into(),
            user_id: user_id.into(),
            user_avatar: String::new(),
            message: message.into(),
            message_id: String::new(),
            is_moderator: false,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.user_avatar = avatar.into();
        self
    }

    pub fn as_moderator(mut self) -> Self {
        self.is_moderator = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_identity_fields() {
        let msg = Message::new("room1", "u42", "alice", "hi")
            .with_message_id("m-1")
            .as_moderator();
        assert_eq!(msg.channel, "room1");
        assert_eq!(msg.user_id, "u42");
        assert_eq!(msg.user_name, "alice");
        assert_eq!(msg.message_id, "m-1");
        assert!(msg.is_moderator);
        assert!(msg.user_avatar.is_empty());

        let with_avatar = msg.with_avatar("https://cdn.example/a.png");
        assert_eq!(with_avatar.user_avatar, "https://cdn.example/a.png");
    }

    #[test]
    fn optional_fields_default_when_missing_from_json() {
        let json = r#"{"channel":"c","user_name":"n","user_id":"i","message":"t"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message, "t");
        assert!(!msg.is_moderator);
        assert!(msg.message_id.is_empty());
    }
}
