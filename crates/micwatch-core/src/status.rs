//! Reported microphone status.

use std::fmt;

/// Microphone status as reported to ActivityWatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicStatus {
    /// Something is capturing audio
    On,
    /// Nothing is capturing audio
    Off,
}

impl MicStatus {
    /// Title stored in the event data.
    pub fn title(self) -> &'static str {
        match self {
            Self::On => "Mic on",
            Self::Off => "Mic off",
        }
    }
}

impl From<bool> for MicStatus {
    fn from(active: bool) -> Self {
        if active { Self::On } else { Self::Off }
    }
}

impl fmt::Display for MicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
