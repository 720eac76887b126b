//! Bounded external command invocation.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Upper bound on how long an external tool may run before it is killed.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output is still collected after the child has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started, usually because it is not installed
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Reading the output or reaping the child failed
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The program did not finish in time and was killed
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Exit status and standard output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    /// Standard output decoded as lossy UTF-8
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs. A non-zero exit is reported through
/// [`CommandOutput::code`], not as an error.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes with stderr discarded and a timeout.
///
/// The timeout bounds the child's exit. Output still buffered in the pipe when
/// the child exits is collected for a short grace period, so a detached
/// descendant holding stdout open does not turn a finished run into a timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("child stdout was not captured").into());
        };

        // The pipe is drained on its own thread so the exit can be polled with
        // a deadline. Chunks are forwarded as they arrive.
        let (output_tx, output_rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("micwatch-command-stdout".to_string())
            .spawn(move || forward_chunks(&mut stdout, &output_tx));
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }

        let deadline = Instant::now() + self.timeout;
        let mut buf = Vec::new();
        let mut drained = false;
        loop {
            if let Some(status) = child.try_wait()? {
                if !drained {
                    collect_remaining(&output_rx, &mut buf)?;
                }
                return Ok(CommandOutput {
                    code: status.code(),
                    stdout: String::from_utf8_lossy(&buf).into_owned(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::Timeout {
                    program: program.to_owned(),
                    timeout: self.timeout,
                });
            }
            let wait = EXIT_POLL_INTERVAL.min(deadline - now);

            if drained {
                thread::sleep(wait);
                continue;
            }
            match output_rx.recv_timeout(wait) {
                Ok(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Ok(Err(e)) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => drained = true,
            }
        }
    }
}

fn forward_chunks(stdout: &mut impl Read, tx: &mpsc::Sender<io::Result<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match stdout.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                if tx.send(Ok(chunk[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

/// Collect output written before the child exited. A background process that
/// inherited the pipe can keep it open, so this waits at most
/// [`EXIT_DRAIN_GRACE`] for end of file.
fn collect_remaining(
    rx: &mpsc::Receiver<io::Result<Vec<u8>>>,
    buf: &mut Vec<u8>,
) -> io::Result<()> {
    let deadline = Instant::now() + EXIT_DRAIN_GRACE;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_exit_code() {
        let runner = SystemRunner::default();
        let output = runner
            .run("sh", &["-c", "echo one; echo two; echo ignored >&2"])
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "one\ntwo\n");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let runner = SystemRunner::default();
        let output = runner.run("sh", &["-c", "echo partial; exit 3"]).unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "partial\n");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let runner = SystemRunner::default();
        let err = runner
            .run("micwatch-definitely-not-installed", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn test_slow_program_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[test]
    fn test_background_child_holding_stdout_does_not_time_out() {
        let runner = SystemRunner::new(Duration::from_secs(1));
        let started = Instant::now();
        let output = runner.run("sh", &["-c", "sleep 3 & echo hi"]).unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hi\n");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_large_output_is_read_in_full() {
        let runner = SystemRunner::default();
        let script = "i=0; while [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done";
        let output = runner.run("sh", &["-c", script]).unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.lines().count(), 2000);
        assert_eq!(output.stdout.lines().last(), Some("line1999"));
    }
}
