// Re-export from sub-crates
pub use micwatch_client::{ActivityWatchClient, ClientConfig, ClientError, Event, HeartbeatSink};
pub use micwatch_core::{
    APP_NAME, APP_NAME_PRETTY, Config, ConfigManager, DEFAULT_LOG_LEVEL, EVENT_TYPE, MicStatus,
};
pub use micwatch_probe::{MicProbe, Platform, ProbeResult, Unsupported, probe};

// App-specific modules
pub mod statusline;
pub mod watcher;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
