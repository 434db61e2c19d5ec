// src/config.rs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Tunables for the dispatch engine. Every field has a default, so a config
/// file only needs the keys it wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Capacity of the merged inbound queue shared by all services.
    pub queue_capacity: usize,

    /// Periodic snapshot interval while running. `None` saves only on exit.
    pub autosave_secs: Option<u64>,

    /// Upper bound on a single plugin `load`/`message` call.
    pub plugin_timeout_ms: Option<u64>,

    /// How many plugin failures `Bot::failures` keeps.
    pub failure_history: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            autosave_secs: Some(300),
            plugin_timeout_ms: Some(30_000),
            failure_history: 64,
        }
    }
}

impl BotConfig {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let cfg: BotConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.autosave_secs == Some(0) {
            return Err(Error::Config("autosave_secs must be positive".into()));
        }
        if self.plugin_timeout_ms == Some(0) {
            return Err(Error::Config("plugin_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        self.autosave_secs.map(Duration::from_secs)
    }

    pub fn plugin_timeout(&self) -> Option<Duration> {
        self.plugin_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = BotConfig::from_json(r#"{ "queue_capacity": 8 }"#).unwrap();
        assert_eq!(cfg.queue_capacity, 8);
        assert_eq!(cfg.autosave_secs, Some(300));
        assert_eq!(cfg.plugin_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn null_disables_autosave() {
        let cfg = BotConfig::from_json(r#"{ "autosave_secs": null }"#).unwrap();
        assert!(cfg.autosave_interval().is_none());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BotConfig::from_json(r#"{ "queue_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaybot.json");
        std::fs::write(&path, r#"{ "failure_history": 3 }"#).unwrap();
        let cfg = BotConfig::from_file(&path).unwrap();
        assert_eq!(cfg.failure_history, 3);
    }
}
