//! Command runner abstraction and the process-backed implementation.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::RemoteError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Standard output and standard error, interleaved as written.
    pub output: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing combined output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the command cannot be started or its output
    /// cannot be captured. A command killed for exceeding a timeout is not an
    /// error: it reports no exit code and keeps the output it produced.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;
}

/// Real command runner that shells out to the host operating system.
///
/// Both output streams share one anonymous temporary file so the captured
/// text keeps the order in which the process wrote it.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner {
    timeout: Option<Duration>,
}

impl ProcessCommandRunner {
    /// Creates a runner that waits for commands without a time limit.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Kills commands still running after `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn wait(&self, child: &mut Child, program: &str) -> Result<Completion, RemoteError> {
        let spawn_error = |err: std::io::Error| RemoteError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        };

        let Some(limit) = self.timeout else {
            return child.wait().map(Completion::Exited).map_err(spawn_error);
        };

        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait().map_err(spawn_error)? {
                return Ok(Completion::Exited(status));
            }
            if Instant::now() >= deadline {
                child.kill().ok();
                child.wait().ok();
                return Ok(Completion::Killed { after: limit });
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

/// How a spawned command ended.
enum Completion {
    Exited(ExitStatus),
    Killed { after: Duration },
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let capture_error = |err: std::io::Error| RemoteError::Capture {
            program: program.to_owned(),
            message: err.to_string(),
        };

        let mut capture = tempfile::tempfile().map_err(capture_error)?;
        let stdout = capture.try_clone().map_err(capture_error)?;
        let stderr = capture.try_clone().map_err(capture_error)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|err| RemoteError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        let completion = self.wait(&mut child, program)?;
        let captured = read_capture(&mut capture).map_err(capture_error)?;

        // A killed command keeps whatever it printed, followed by a note.
        Ok(match completion {
            Completion::Exited(status) => CommandOutput {
                code: status.code(),
                output: captured,
            },
            Completion::Killed { after } => {
                let separator = if captured.is_empty() || captured.ends_with('\n') {
                    ""
                } else {
                    "\n"
                };
                CommandOutput {
                    code: None,
                    output: format!(
                        "{captured}{separator}{program} killed after {}s without completing\n",
                        after.as_secs()
                    ),
                }
            }
        })
    }
}

fn read_capture(capture: &mut File) -> std::io::Result<String> {
    capture.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    capture.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
