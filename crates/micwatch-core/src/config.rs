//! Configuration management for micwatch.
//!
//! The settings live in an ActivityWatch style TOML file, under a table named
//! after the watcher:
//!
//! ```toml
//! [aw-watcher-mic-status]
//! poll_time = 0.5
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::APP_NAME;

/// Default ActivityWatch server port.
pub const DEFAULT_PORT: u16 = 5600;

/// ActivityWatch server port used in testing mode.
pub const DEFAULT_TESTING_PORT: u16 = 5666;

/// Watcher settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Seconds between two microphone probes
    #[serde(
        default = "default_poll_time",
        skip_serializing_if = "is_default_poll_time"
    )]
    pub poll_time: f32,

    /// Longest a single probe and heartbeat may take, in seconds. Added to the
    /// poll time to form the heartbeat pulsetime so consecutive heartbeats merge.
    #[serde(
        default = "default_max_action_time",
        skip_serializing_if = "is_default_max_action_time"
    )]
    pub max_action_time: f32,

    /// ActivityWatch server host
    #[serde(default = "default_host", skip_serializing_if = "is_default_host")]
    pub host: String,

    /// ActivityWatch server port, defaults depend on `testing`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Talk to the testing server instead of the production one
    #[serde(default, skip_serializing_if = "is_false")]
    pub testing: bool,

    /// Seconds an external probing tool may run before it is killed
    #[serde(
        default = "default_probe_timeout",
        skip_serializing_if = "is_default_probe_timeout"
    )]
    pub probe_timeout: f32,
}

fn default_poll_time() -> f32 {
    0.5
}

fn is_default_poll_time(v: &f32) -> bool {
    (*v - default_poll_time()).abs() < f32::EPSILON
}

fn default_max_action_time() -> f32 {
    0.5
}

fn is_default_max_action_time(v: &f32) -> bool {
    (*v - default_max_action_time()).abs() < f32::EPSILON
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn is_default_host(v: &String) -> bool {
    *v == default_host()
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn default_probe_timeout() -> f32 {
    2.0
}

fn is_default_probe_timeout(v: &f32) -> bool {
    (*v - default_probe_timeout()).abs() < f32::EPSILON
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_time: default_poll_time(),
            max_action_time: default_max_action_time(),
            host: default_host(),
            port: None,
            testing: false,
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl Config {
    /// Interval between probes.
    pub fn poll_time(&self) -> Duration {
        Duration::from_secs_f32(self.poll_time)
    }

    /// Heartbeat merge window in seconds.
    pub fn pulsetime(&self) -> f64 {
        f64::from(self.poll_time) + f64::from(self.max_action_time)
    }

    /// Server port, falling back to the default for the current mode.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.testing => DEFAULT_TESTING_PORT,
            None => DEFAULT_PORT,
        }
    }

    /// Timeout for external probing tools.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.probe_timeout)
    }

    /// Reject values that would make the poll loop misbehave.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("poll_time", self.poll_time),
            ("probe_timeout", self.probe_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{} must be a positive number of seconds, got {}", name, value);
            }
            if let Err(e) = Duration::try_from_secs_f32(value) {
                bail!("{} of {} seconds is out of range: {}", name, value, e);
            }
        }
        if !self.max_action_time.is_finite() || self.max_action_time < 0.0 {
            bail!(
                "max_action_time must not be negative, got {}",
                self.max_action_time
            );
        }
        Ok(())
    }
}

/// On-disk layout: the settings nested under the watcher's table.
#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigFile {
    #[serde(rename = "aw-watcher-mic-status", default)]
    watcher: Config,
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    pub fn with_config_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file, inside the
    /// ActivityWatch configuration directory.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir
            .join("activitywatch")
            .join(APP_NAME)
            .join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(path = ?self.config_path, "No config file, using defaults");
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let file: ConfigFile = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        file.watcher
            .validate()
            .with_context(|| format!("Invalid config file at {:?}", self.config_path))?;

        Ok(file.watcher)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let file = ConfigFile {
            watcher: config.clone(),
        };
        let serialized =
            toml::to_string_pretty(&file).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
