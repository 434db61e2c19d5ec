// ================================================================
// File: relaybot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// `Service::open` called on an instance that already produced a stream.
    #[error("Already joined.")]
    AlreadyJoined,

    #[error("Connection error: {0}")]
    Connection(String),

    // Action failures reported by a backend:
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Unsupported action: {0}")]
    Unsupported(String),

    #[error("Platform error: {0}")]
    Platform(String),

    // Setup-time registration errors:
    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Command already registered: {0}")]
    DuplicateCommand(String),

    #[error("Plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    #[error("Bot is already open")]
    BotAlreadyOpen,

    #[error("Bot has not been opened")]
    BotNotOpen,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors a backend returns when rejecting an outbound action.
    pub fn is_action_failure(&self) -> bool {
        matches!(
            self,
            Error::PermissionDenied(_)
                | Error::RateLimited(_)
                | Error::NotFound(_)
                | Error::Unsupported(_)
                | Error::Platform(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Platform(e.to_string())
    }
}
