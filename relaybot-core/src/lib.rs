// src/lib.rs

pub mod bot;
pub mod commands;
pub mod config;
pub mod messaging;
pub mod persistence;
pub mod platforms;
pub mod plugins;
pub mod test_utils;

pub use bot::Bot;
pub use config::BotConfig;
pub use platforms::{Service, ServiceRef, ServiceState};
pub use plugins::Plugin;
pub use relaybot_common::error::Error;
pub use relaybot_common::models::Message;
