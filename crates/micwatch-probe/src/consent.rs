//! Windows detection via the capability access manager usage counters.
//!
//! Windows records, per consuming application, when it last started and
//! stopped using a privacy-sensitive capability:
//!
//! ```text
//! HKCU\...\CapabilityAccessManager\ConsentStore\microphone\<app>
//!     LastUsedTimeStart  REG_QWORD  (FILETIME ticks, 0 = never)
//!     LastUsedTimeStop   REG_QWORD
//! ```
//!
//! Packaged apps live directly under the capability key, classic desktop
//! apps one level deeper under `NonPackaged`. A start newer than the stop
//! means the app is using the capability right now.

#[cfg(windows)]
mod registry;

#[cfg(windows)]
pub use registry::SystemRegistry;
use thiserror::Error;
use tracing::debug;

use crate::{MicProbe, ProbeResult};

/// Registry path of the consent store, relative to `HKEY_CURRENT_USER`.
pub const CONSENT_STORE_PATH: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore";

/// Subkey holding the entries of non-packaged desktop applications.
pub const NON_PACKAGED: &str = "NonPackaged";

const MICROPHONE: &str = "microphone";
const LAST_USED_START: &str = "LastUsedTimeStart";
const LAST_USED_STOP: &str = "LastUsedTimeStop";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry key or value not found")]
    NotFound,
    #[error("registry access denied")]
    AccessDenied,
    #[error("registry value {name} has unexpected type {kind}")]
    UnexpectedType { name: String, kind: u32 },
    #[error("registry operation failed with code {0}")]
    Os(u32),
}

/// Read-only access to the current user's registry hive.
pub trait Registry {
    type Key: RegistryKey;

    /// Open a key by path relative to `HKEY_CURRENT_USER`.
    fn open(&self, path: &str) -> Result<Self::Key, RegistryError>;
}

/// An open registry key. Implementations release the key when dropped.
pub trait RegistryKey: Sized {
    fn open_subkey(&self, name: &str) -> Result<Self, RegistryError>;

    /// Names of the immediate subkeys, in registry order.
    fn subkey_names(&self) -> Result<Vec<String>, RegistryError>;

    /// Read an integer value (`REG_QWORD` or `REG_DWORD`).
    fn read_u64(&self, name: &str) -> Result<u64, RegistryError>;
}

/// Detects microphone use from the consent store usage counters.
#[derive(Debug, Clone)]
pub struct ConsentStoreProbe<R> {
    registry: R,
    capability: String,
}

impl<R: Registry> ConsentStoreProbe<R> {
    /// Probe the `microphone` capability.
    pub fn new(registry: R) -> Self {
        Self::with_capability(registry, MICROPHONE)
    }

    /// Probe another capability tracked by the consent store, e.g. `webcam`.
    pub fn with_capability(registry: R, capability: impl Into<String>) -> Self {
        Self {
            registry,
            capability: capability.into(),
        }
    }

    /// Find the first consumer currently using the capability.
    ///
    /// Top-level (packaged) entries are scanned before `NonPackaged` ones.
    /// Errors opening the capability key are returned; per-entry problems
    /// only make that entry count as inactive.
    pub fn scan(&self) -> Result<Option<String>, RegistryError> {
        let root = self
            .registry
            .open(&format!(r"{}\{}", CONSENT_STORE_PATH, self.capability))?;

        if let Some(name) = first_in_use(&root)? {
            return Ok(Some(name));
        }

        let non_packaged = match root.open_subkey(NON_PACKAGED) {
            Ok(key) => key,
            Err(RegistryError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        first_in_use(&non_packaged)
    }
}

impl<R: Registry> MicProbe for ConsentStoreProbe<R> {
    fn probe(&self) -> ProbeResult {
        match self.scan() {
            Ok(Some(name)) => ProbeResult::active(name),
            Ok(None) => ProbeResult::off(),
            Err(e) => {
                debug!(capability = %self.capability, error = %e, "consent store unavailable");
                ProbeResult::off()
            }
        }
    }
}

fn first_in_use<K: RegistryKey>(parent: &K) -> Result<Option<String>, RegistryError> {
    for name in parent.subkey_names()? {
        let key = match parent.open_subkey(&name) {
            Ok(key) => key,
            Err(e) => {
                debug!(subkey = %name, error = %e, "skipping consent entry");
                continue;
            }
        };
        if in_use(&key, &name) {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

fn in_use<K: RegistryKey>(key: &K, name: &str) -> bool {
    let counters = key
        .read_u64(LAST_USED_START)
        .and_then(|start| key.read_u64(LAST_USED_STOP).map(|stop| (start, stop)));

    match counters {
        Ok((start, stop)) => start > stop,
        Err(RegistryError::NotFound) => false,
        Err(e) => {
            debug!(subkey = %name, error = %e, "unreadable usage counters");
            false
        }
    }
}
