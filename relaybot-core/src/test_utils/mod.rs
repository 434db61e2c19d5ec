// src/test_utils/mod.rs
//
// In-memory stand-ins for services and plugins, shared by unit and
// integration tests.

pub mod mock_service;
pub mod recording_plugin;

pub use mock_service::{MockService, ServiceAction};
pub use recording_plugin::{DeliveryLog, LogEvent, RecordingPlugin};
