//! Microphone activity detection.
//!
//! There is no cross-platform API that answers "is the microphone capturing
//! right now?", so this crate infers it from a different piece of live OS
//! state on each platform:
//!
//! * Windows: the privacy usage counters kept under the `ConsentStore`
//!   registry tree ([`ConsentStoreProbe`]).
//! * macOS: device nodes held open by the `coreaudiod` daemon
//!   ([`CoreAudioProbe`]).
//! * Linux: ALSA substream status files under `/proc/asound` ([`AlsaProbe`]).
//!
//! Every probe is synchronous, keeps no state between calls and never returns
//! an error for missing or unreadable system state. Platforms outside the three
//! above get an explicit [`Unsupported`] outcome instead of a negative result.

mod alsa;
mod command;
mod consent;
mod coreaudio;

use std::time::Duration;

pub use alsa::{ALSA_ROOT, AlsaProbe};
pub use command::{
    CommandError, CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT, SystemRunner,
};
#[cfg(windows)]
pub use consent::SystemRegistry;
pub use consent::{
    CONSENT_STORE_PATH, ConsentStoreProbe, NON_PACKAGED, Registry, RegistryError, RegistryKey,
};
pub use coreaudio::CoreAudioProbe;
use thiserror::Error;

/// Label reported when no capture is detected.
pub const OFF_LABEL: &str = "off";

/// Label reported by probes that cannot identify the consumer.
pub const ACTIVE_LABEL: &str = "Active";

/// The outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Whether affirmative evidence of capture was found
    pub active: bool,
    /// Best-effort identifier of the consumer, or [`OFF_LABEL`]. Never empty.
    pub label: String,
}

impl ProbeResult {
    /// No capture detected.
    pub fn off() -> Self {
        Self {
            active: false,
            label: OFF_LABEL.to_owned(),
        }
    }

    /// Capture detected for the given consumer label.
    pub fn active(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            active: true,
            label: if label.is_empty() {
                ACTIVE_LABEL.to_owned()
            } else {
                label
            },
        }
    }
}

/// Returned when microphone activity cannot be determined on this platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("microphone detection is not supported on {os}")]
pub struct Unsupported {
    pub os: String,
}

/// A platform strategy for detecting microphone activity.
pub trait MicProbe {
    /// Inspect live OS state and report whether the microphone is in use.
    fn probe(&self) -> ProbeResult;
}

/// The operating system families with a detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Match an OS name case-insensitively. Accepts both `std::env::consts::OS`
    /// style names (`macos`) and `uname` style names (`Darwin`).
    pub fn from_os_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name.starts_with("win") {
            Some(Self::Windows)
        } else if name == "darwin" || name == "macos" {
            Some(Self::MacOs)
        } else if name == "linux" {
            Some(Self::Linux)
        } else {
            None
        }
    }

    /// The platform this process is running on, if it is supported.
    pub fn current() -> Option<Self> {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Build the detection strategy for this platform.
    ///
    /// Windows detection needs the registry API, which only exists in Windows
    /// builds; elsewhere it is reported as unsupported.
    pub fn strategy(self) -> Result<Box<dyn MicProbe + Send + Sync>, Unsupported> {
        self.strategy_with_timeout(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Like [`Platform::strategy`], bounding external tools by `timeout`.
    pub fn strategy_with_timeout(
        self,
        timeout: Duration,
    ) -> Result<Box<dyn MicProbe + Send + Sync>, Unsupported> {
        match self {
            #[cfg(windows)]
            Self::Windows => Ok(Box::new(ConsentStoreProbe::new(SystemRegistry))),
            #[cfg(not(windows))]
            Self::Windows => Err(Unsupported {
                os: "windows".to_owned(),
            }),
            Self::MacOs => Ok(Box::new(CoreAudioProbe::new(SystemRunner::new(timeout)))),
            Self::Linux => Ok(Box::new(AlsaProbe::default())),
        }
    }
}

/// Check whether the microphone is in use on the running platform.
pub fn probe() -> Result<ProbeResult, Unsupported> {
    probe_os(std::env::consts::OS)
}

/// Check whether the microphone is in use, dispatching on an explicit OS name.
pub fn probe_os(os_name: &str) -> Result<ProbeResult, Unsupported> {
    let platform = Platform::from_os_name(os_name).ok_or_else(|| Unsupported {
        os: os_name.to_owned(),
    })?;
    Ok(platform.strategy()?.probe())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::from_os_name("Windows"), Some(Platform::Windows));
        assert_eq!(Platform::from_os_name("win32"), Some(Platform::Windows));
        assert_eq!(Platform::from_os_name("Darwin"), Some(Platform::MacOs));
        assert_eq!(Platform::from_os_name("macos"), Some(Platform::MacOs));
        assert_eq!(Platform::from_os_name("LINUX"), Some(Platform::Linux));
        assert_eq!(Platform::from_os_name("freebsd"), None);
        assert_eq!(Platform::from_os_name(""), None);
    }

    #[test]
    fn test_unsupported_is_not_off() {
        let outcome = probe_os("haiku");
        assert_eq!(
            outcome,
            Err(Unsupported {
                os: "haiku".to_owned()
            })
        );
        assert_ne!(outcome, Ok(ProbeResult::off()));
    }

    #[test]
    fn test_active_label_never_empty() {
        assert_eq!(ProbeResult::active("").label, ACTIVE_LABEL);
        assert_eq!(ProbeResult::active("zoom").label, "zoom");
        assert!(!ProbeResult::off().active);
        assert_eq!(ProbeResult::off().label, OFF_LABEL);
    }

    #[cfg(any(windows, target_os = "macos", target_os = "linux"))]
    #[test]
    fn test_current_platform_is_supported() {
        assert!(Platform::current().is_some());
        let result = probe().expect("current platform should be supported");
        assert!(!result.label.is_empty());
    }
}
