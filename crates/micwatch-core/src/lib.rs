//! Core types and configuration for micwatch.
//!
//! This crate holds the pieces shared by the watcher binary and its
//! sub-crates that do not depend on any platform API.

mod config;
mod status;

pub use config::{Config, ConfigManager, DEFAULT_PORT, DEFAULT_TESTING_PORT};
pub use status::MicStatus;

/// Watcher name, used as ActivityWatch client name and config file name
pub const APP_NAME: &str = "aw-watcher-mic-status";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "micwatch";

/// ActivityWatch event type of the reported events
pub const EVENT_TYPE: &str = "mic_status_data";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";
