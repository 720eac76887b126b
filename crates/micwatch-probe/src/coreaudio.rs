//! macOS detection via the files held open by `coreaudiod`.
//!
//! The audio daemon only keeps device nodes open while a stream is running,
//! so listing its open files is a cheap, unprivileged activity check.

use tracing::debug;

use crate::command::{CommandOutput, CommandRunner, SystemRunner};
use crate::{ACTIVE_LABEL, MicProbe, ProbeResult};

const LSOF: &str = "lsof";
/// Field output (`-Fn`) keeps one `n<path>` line per file, without name lookups.
const LSOF_ARGS: &[&str] = &["-Fn", "-c", "coreaudiod"];
const DEVICE_MARKER: &str = "/dev/";

/// Detects microphone use from `lsof` output for the audio daemon.
#[derive(Debug, Clone)]
pub struct CoreAudioProbe<R = SystemRunner> {
    runner: R,
}

impl Default for CoreAudioProbe<SystemRunner> {
    fn default() -> Self {
        Self::new(SystemRunner::default())
    }
}

impl<R: CommandRunner> CoreAudioProbe<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> MicProbe for CoreAudioProbe<R> {
    fn probe(&self) -> ProbeResult {
        match self.runner.run(LSOF, LSOF_ARGS) {
            Ok(output) => evaluate_listing(&output),
            Err(e) => {
                debug!(error = %e, "coreaudiod file listing failed");
                ProbeResult::off()
            }
        }
    }
}

fn evaluate_listing(output: &CommandOutput) -> ProbeResult {
    if !output.success() {
        // daemon not running, lsof missing a match, or any other failure
        debug!(code = ?output.code, "lsof exited unsuccessfully");
        return ProbeResult::off();
    }

    if output.stdout.lines().any(|line| line.contains(DEVICE_MARKER)) {
        ProbeResult::active(ACTIVE_LABEL)
    } else {
        ProbeResult::off()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::command::CommandError;

    struct FakeRunner {
        code: Option<i32>,
        stdout: &'static str,
        calls: Cell<usize>,
    }

    impl FakeRunner {
        fn new(code: Option<i32>, stdout: &'static str) -> Self {
            Self {
                code,
                stdout,
                calls: Cell::new(0),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
            assert_eq!(program, "lsof");
            assert_eq!(args, ["-Fn", "-c", "coreaudiod"]);
            self.calls.set(self.calls.get() + 1);
            Ok(CommandOutput {
                code: self.code,
                stdout: self.stdout.to_owned(),
            })
        }
    }

    struct MissingTool;

    impl CommandRunner for MissingTool {
        fn run(&self, program: &str, _args: &[&str]) -> Result<CommandOutput, CommandError> {
            Err(CommandError::Spawn {
                program: program.to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    #[test]
    fn test_device_node_means_active() {
        let probe = CoreAudioProbe::new(FakeRunner::new(
            Some(0),
            "p187\nn/usr/sbin/coreaudiod\nn/dev/coreaudio/input0\n",
        ));
        assert_eq!(probe.probe(), ProbeResult::active("Active"));
    }

    #[test]
    fn test_no_device_node_means_off() {
        let probe = CoreAudioProbe::new(FakeRunner::new(
            Some(0),
            "p187\nn/usr/sbin/coreaudiod\nn/private/var/db/mds\n",
        ));
        assert_eq!(probe.probe(), ProbeResult::off());
    }

    #[test]
    fn test_nonzero_exit_means_off() {
        let probe = CoreAudioProbe::new(FakeRunner::new(Some(1), "n/dev/coreaudio/input0\n"));
        assert_eq!(probe.probe(), ProbeResult::off());
    }

    #[test]
    fn test_signal_termination_means_off() {
        let probe = CoreAudioProbe::new(FakeRunner::new(None, "n/dev/coreaudio/input0\n"));
        assert_eq!(probe.probe(), ProbeResult::off());
    }

    #[test]
    fn test_missing_tool_means_off() {
        let probe = CoreAudioProbe::new(MissingTool);
        assert_eq!(probe.probe(), ProbeResult::off());
    }

    #[test]
    fn test_repeated_probes_agree() {
        let probe = CoreAudioProbe::new(FakeRunner::new(Some(0), "n/dev/coreaudio/input0\n"));
        assert_eq!(probe.probe(), probe.probe());
        assert_eq!(probe.runner.calls.get(), 2);
    }
}
