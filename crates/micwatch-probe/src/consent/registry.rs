//! Win32 registry access for the consent store scan.

use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS,
    ERROR_SUCCESS, WIN32_ERROR,
};
use windows::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_READ, REG_DWORD, REG_QWORD, REG_VALUE_TYPE, RegCloseKey,
    RegEnumKeyExW, RegOpenKeyExW, RegQueryValueExW,
};
use windows::core::{PCWSTR, PWSTR};

use super::{Registry, RegistryError, RegistryKey};

/// Registry key names are limited to 255 characters.
const MAX_KEY_NAME: usize = 256;

/// The live `HKEY_CURRENT_USER` hive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRegistry;

impl Registry for SystemRegistry {
    type Key = OwnedKey;

    fn open(&self, path: &str) -> Result<OwnedKey, RegistryError> {
        OwnedKey::open(HKEY_CURRENT_USER, path)
    }
}

/// A registry handle closed on drop.
#[derive(Debug)]
pub struct OwnedKey(HKEY);

impl OwnedKey {
    fn open(parent: HKEY, path: &str) -> Result<Self, RegistryError> {
        let path = wide(path);
        let mut handle = HKEY::default();
        // SAFETY: `path` is NUL terminated and outlives the call.
        let status =
            unsafe { RegOpenKeyExW(parent, PCWSTR(path.as_ptr()), 0, KEY_READ, &mut handle) };
        check(status)?;
        Ok(Self(handle))
    }
}

impl Drop for OwnedKey {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by `RegOpenKeyExW` and is closed once.
        let _ = unsafe { RegCloseKey(self.0) };
    }
}

impl RegistryKey for OwnedKey {
    fn open_subkey(&self, name: &str) -> Result<Self, RegistryError> {
        Self::open(self.0, name)
    }

    fn subkey_names(&self) -> Result<Vec<String>, RegistryError> {
        let mut names = Vec::new();
        let mut buf = [0u16; MAX_KEY_NAME];

        for index in 0.. {
            let mut len = buf.len() as u32;
            // SAFETY: `len` holds the capacity of `buf` in characters.
            let status = unsafe {
                RegEnumKeyExW(
                    self.0,
                    index,
                    PWSTR(buf.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            check(status)?;
            names.push(String::from_utf16_lossy(&buf[..len as usize]));
        }

        Ok(names)
    }

    fn read_u64(&self, name: &str) -> Result<u64, RegistryError> {
        let value_name = wide(name);
        let mut kind = REG_VALUE_TYPE::default();
        let mut data = 0u64;
        let mut size = size_of::<u64>() as u32;

        // SAFETY: `data` provides `size` writable bytes; a DWORD fills the low
        // half, which is the little-endian value itself.
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(value_name.as_ptr()),
                None,
                Some(&mut kind),
                Some(&mut data as *mut u64 as *mut u8),
                Some(&mut size),
            )
        };
        if status == ERROR_MORE_DATA {
            return Err(RegistryError::UnexpectedType {
                name: name.to_owned(),
                kind: kind.0,
            });
        }
        check(status)?;

        if kind != REG_QWORD && kind != REG_DWORD {
            return Err(RegistryError::UnexpectedType {
                name: name.to_owned(),
                kind: kind.0,
            });
        }
        Ok(data)
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn check(status: WIN32_ERROR) -> Result<(), RegistryError> {
    if status == ERROR_SUCCESS {
        Ok(())
    } else if status == ERROR_FILE_NOT_FOUND {
        Err(RegistryError::NotFound)
    } else if status == ERROR_ACCESS_DENIED {
        Err(RegistryError::AccessDenied)
    } else {
        Err(RegistryError::Os(status.0))
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::System::Registry::{REG_SZ, RegCreateKeyW, RegDeleteTreeW, RegSetValueExW};

    use super::*;
    use crate::{ConsentStoreProbe, MicProbe, ProbeResult};

    /// A throwaway key below `HKCU\Software`, deleted with its values on drop.
    struct ScratchKey {
        path: String,
    }

    impl ScratchKey {
        fn create(name: &str) -> Self {
            let path = format!("Software\\micwatch-test-{}-{}", name, std::process::id());
            let key = create_key(&path);
            set_value(&key, "Start", REG_QWORD, &133_500_000_000_000_000u64.to_le_bytes());
            set_value(&key, "Small", REG_DWORD, &42u32.to_le_bytes());
            let text: Vec<u8> = wide("not a counter")
                .iter()
                .flat_map(|unit| unit.to_le_bytes())
                .collect();
            set_value(&key, "Text", REG_SZ, &text);
            drop(create_key(&format!("{}\\child", path)));
            Self { path }
        }
    }

    impl Drop for ScratchKey {
        fn drop(&mut self) {
            let path = wide(&self.path);
            let _ = unsafe { RegDeleteTreeW(HKEY_CURRENT_USER, PCWSTR(path.as_ptr())) };
        }
    }

    fn create_key(path: &str) -> OwnedKey {
        let path = wide(path);
        let mut handle = HKEY::default();
        let status =
            unsafe { RegCreateKeyW(HKEY_CURRENT_USER, PCWSTR(path.as_ptr()), &mut handle) };
        assert_eq!(status, ERROR_SUCCESS);
        OwnedKey(handle)
    }

    fn set_value(key: &OwnedKey, name: &str, kind: REG_VALUE_TYPE, data: &[u8]) {
        let name = wide(name);
        let status = unsafe { RegSetValueExW(key.0, PCWSTR(name.as_ptr()), 0, kind, Some(data)) };
        assert_eq!(status, ERROR_SUCCESS);
    }

    #[test]
    fn test_lists_software_subkeys() {
        let software = SystemRegistry.open("Software").unwrap();
        assert!(!software.subkey_names().unwrap().is_empty());
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let err = SystemRegistry
            .open("Software\\micwatch-key-that-does-not-exist")
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound);
    }

    #[test]
    fn test_reads_qword_and_dword_counters() {
        let scratch = ScratchKey::create("counters");
        let key = SystemRegistry.open(&scratch.path).unwrap();

        assert_eq!(key.read_u64("Start"), Ok(133_500_000_000_000_000));
        assert_eq!(key.read_u64("Small"), Ok(42));
    }

    #[test]
    fn test_missing_and_string_values() {
        let scratch = ScratchKey::create("values");
        let key = SystemRegistry.open(&scratch.path).unwrap();

        assert_eq!(key.read_u64("Stop"), Err(RegistryError::NotFound));
        assert!(matches!(
            key.read_u64("Text"),
            Err(RegistryError::UnexpectedType { ref name, .. }) if name == "Text"
        ));
    }

    #[test]
    fn test_opens_and_lists_subkeys() {
        let scratch = ScratchKey::create("subkeys");
        let key = SystemRegistry.open(&scratch.path).unwrap();

        assert_eq!(key.subkey_names(), Ok(vec!["child".to_owned()]));
        let child = key.open_subkey("child").unwrap();
        assert_eq!(child.subkey_names(), Ok(Vec::new()));
        assert_eq!(key.open_subkey("missing").unwrap_err(), RegistryError::NotFound);
    }

    #[test]
    fn test_reopening_keys_releases_handles() {
        let scratch = ScratchKey::create("handles");
        for _ in 0..20_000 {
            let key = SystemRegistry.open(&scratch.path).unwrap();
            assert_eq!(key.read_u64("Small"), Ok(42));
        }
    }

    #[test]
    fn test_live_consent_store_probe() {
        let result = ConsentStoreProbe::new(SystemRegistry).probe();
        assert!(!result.label.is_empty());
        if !result.active {
            assert_eq!(result, ProbeResult::off());
        }
    }
}
