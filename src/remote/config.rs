//! SSH settings for the remote executor and associated error types.
//!
//! Configuration is loaded via `ortho-config`, which merges defaults and
//! `BROKER_SSH_*` environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Administrative user on the proxy images.
pub const DEFAULT_SSH_USER: &str = "ubuntu";

/// SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "BROKER_SSH")]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = DEFAULT_SSH_USER.to_owned())]
    pub user: String,
    /// TCP port of the SSH daemon on the instances.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// instances are created on demand.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Private key used to authenticate. Supports tilde expansion. When unset,
    /// SSH falls back to its default key locations.
    pub identity_file: Option<String>,
    /// Seconds allowed for the SSH session to be established.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Seconds after which a running remote command is killed. Zero disables
    /// the limit.
    #[ortho_config(default = 120)]
    pub command_timeout_secs: u64,
}

impl SshConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when a required field is empty
    /// or the connect timeout is zero.
    pub fn validate(&self) -> Result<(), RemoteError> {
        Self::require_value(&self.bin, "bin")?;
        Self::require_value(&self.user, "user")?;
        if let Some(identity) = self.identity_file.as_deref() {
            Self::require_value(identity, "identity_file")?;
        }
        if self.port == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("port"),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("connect_timeout_secs"),
            });
        }
        Ok(())
    }

    /// Loads configuration from defaults and environment variables without
    /// parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ConfigLoad`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, RemoteError> {
        Self::load_from_iter([std::ffi::OsString::from("varnish-broker")])
            .map_err(|err| RemoteError::ConfigLoad(err.to_string()))
    }

    fn require_value(value: &str, field: &str) -> Result<(), RemoteError> {
        if value.trim().is_empty() {
            return Err(RemoteError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

/// Errors surfaced while configuring or running remote commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when configuration is missing or has an unusable value.
    #[error("invalid ssh {field}: set BROKER_SSH_{env_suffix}", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when layered configuration cannot be merged.
    #[error("ssh configuration parsing failed: {0}")]
    ConfigLoad(String),
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the output capture file cannot be created or read.
    #[error("failed to capture output of {program}: {message}")]
    Capture {
        /// Command whose output was being captured.
        program: String,
        /// Operating system error string.
        message: String,
    },
}
