//! Linux detection via ALSA substream status files.
//!
//! The kernel exposes `/proc/asound/card*/pcm*/sub0/status` for every PCM
//! device; a stream that is currently capturing or playing reports
//! `state: RUNNING`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ACTIVE_LABEL, MicProbe, ProbeResult};

/// Root of the ALSA procfs tree.
pub const ALSA_ROOT: &str = "/proc/asound";

const RUNNING_MARKER: &str = "state: RUNNING";

/// Detects microphone use from ALSA substream status files.
#[derive(Debug, Clone)]
pub struct AlsaProbe {
    root: PathBuf,
}

impl Default for AlsaProbe {
    fn default() -> Self {
        Self::new(ALSA_ROOT)
    }
}

impl AlsaProbe {
    /// Create a probe reading the status tree below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All `card*/pcm*/sub0/status` files that exist right now, sorted.
    pub fn status_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for card in matching_dirs(&self.root, "card") {
            for pcm in matching_dirs(&card, "pcm") {
                let status = pcm.join("sub0").join("status");
                if status.is_file() {
                    files.push(status);
                }
            }
        }
        files.sort();
        files
    }
}

impl MicProbe for AlsaProbe {
    fn probe(&self) -> ProbeResult {
        for path in self.status_files() {
            match fs::read(&path) {
                Ok(contents) => {
                    if String::from_utf8_lossy(&contents).contains(RUNNING_MARKER) {
                        return ProbeResult::active(ACTIVE_LABEL);
                    }
                }
                // device unplugged between listing and reading
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    debug!(path = ?path, error = %e, "skipping unreadable status file");
                }
            }
        }
        ProbeResult::off()
    }
}

/// Directories directly under `dir` whose name starts with `prefix`.
fn matching_dirs(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}
