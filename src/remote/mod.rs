//! Remote command execution over the system `ssh` client.
//!
//! Each call opens its own session, runs one command as the configured
//! administrative user, and returns the exit code with the combined output.
//! Results are logged before they are handed back so failures leave a trace
//! even when the caller drops them.

use std::ffi::OsString;
use std::time::Duration;

use tracing::{error, info};

mod config;
mod types;
mod util;

pub use config::{DEFAULT_SSH_USER, RemoteError, SshConfig};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use util::expand_tilde;

/// Exit code reported when no process status is available: the session could
/// not be started, the process was killed by a signal, or it timed out.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Output captured from a remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command, or [`UNKNOWN_EXIT_CODE`].
    pub exit_code: i32,
    /// Interleaved standard output and standard error.
    pub output: String,
}

impl RemoteCommandOutput {
    /// Returns `true` when the remote command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a shell command on a remote host and waits for it to finish.
pub trait RemoteExecutor: Send + Sync {
    /// Executes `command` on `host`. Transport failures are reported through
    /// a non-zero exit code and descriptive output rather than an error.
    fn execute(&self, host: &str, command: &str) -> RemoteCommandOutput;
}

/// Executes commands through the system `ssh` binary.
#[derive(Clone, Debug)]
pub struct SshExecutor<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl SshExecutor<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner, applying
    /// the configured command timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, RemoteError> {
        let runner = match config.command_timeout_secs {
            0 => ProcessCommandRunner::new(),
            secs => ProcessCommandRunner::new().with_timeout(Duration::from_secs(secs)),
        };
        Self::new(config, runner)
    }
}

impl<R: CommandRunner> SshExecutor<R> {
    /// Creates a new executor using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, RemoteError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Runs `command` on `host` once, logging the outcome before returning.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote login shell. Callers must
    /// quote any untrusted input before invoking this method.
    pub fn run(&self, host: &str, command: &str) -> RemoteCommandOutput {
        let args = self.build_ssh_args(host, command);
        let result = match self.runner.run(&self.config.bin, &args) {
            Ok(output) => RemoteCommandOutput {
                exit_code: output.code.unwrap_or(UNKNOWN_EXIT_CODE),
                output: output.output,
            },
            Err(err) => RemoteCommandOutput {
                exit_code: UNKNOWN_EXIT_CODE,
                output: err.to_string(),
            },
        };

        if result.is_success() {
            info!(
                host,
                exit_code = result.exit_code,
                output = %result.output,
                "remote command completed"
            );
        } else {
            error!(
                host,
                exit_code = result.exit_code,
                output = %result.output,
                "remote command failed"
            );
        }

        result
    }

    fn build_ssh_args(&self, host: &str, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(host),
            OsString::from("-l"),
            OsString::from(&self.config.user),
            OsString::from("-p"),
            OsString::from(self.config.port.to_string()),
        ];

        if let Some(ref identity_file) = self.config.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.config.connect_timeout_secs
        )));
        args.push(OsString::from(command));
        args
    }
}

impl<R> RemoteExecutor for SshExecutor<R>
where
    R: CommandRunner + Send + Sync,
{
    fn execute(&self, host: &str, command: &str) -> RemoteCommandOutput {
        self.run(host, command)
    }
}
