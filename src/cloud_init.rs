//! Cloud-init user-data for new proxy instances.
//!
//! The broker reaches instances over SSH, so every instance it creates must
//! trust the broker's public key. The key is read from a file and installed
//! through a `#cloud-config` document on first boot.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::remote::expand_tilde;

/// Errors raised while building cloud-init user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CloudInitError {
    /// Raised when a file path is empty or only whitespace.
    #[error("authorized key file path must not be empty")]
    FilePathEmpty,
    /// Raised when the key file is empty or only whitespace.
    #[error("authorized key file `{path}` is empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading the key file fails.
    #[error("failed to read authorized key file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the key cannot be embedded in a single-quoted YAML scalar.
    #[error("authorized key must be a single line without single quotes")]
    InvalidKey,
}

/// Renders the cloud-config document that authorises `public_key`.
///
/// # Errors
///
/// Returns [`CloudInitError::InvalidKey`] when the key spans several lines
/// or contains a single quote.
///
/// # Examples
///
/// ```
/// # use varnish_broker::cloud_init::authorized_keys_user_data;
/// let data = authorized_keys_user_data("ssh-ed25519 AAAA broker").unwrap();
/// assert_eq!(data, "#cloud-config\nssh_authorized_keys: ['ssh-ed25519 AAAA broker']\n");
/// ```
pub fn authorized_keys_user_data(public_key: &str) -> Result<String, CloudInitError> {
    let key = public_key.trim();
    if key.is_empty() || key.contains(['\'', '\n', '\r']) {
        return Err(CloudInitError::InvalidKey);
    }
    Ok(format!("#cloud-config\nssh_authorized_keys: ['{key}']\n"))
}

/// Reads the public key at `path` and renders its cloud-config document.
///
/// A leading `~/` in `path` is expanded against `HOME`.
///
/// # Errors
///
/// Returns [`CloudInitError`] when the path is blank, the file cannot be read
/// or is empty, or the key is malformed.
pub fn authorized_keys_user_data_from_file(path: &str) -> Result<String, CloudInitError> {
    if path.trim().is_empty() {
        return Err(CloudInitError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content =
        read_to_string_ambient(&expanded).map_err(|message| CloudInitError::FileRead {
            path: expanded.clone(),
            message,
        })?;

    if content.trim().is_empty() {
        return Err(CloudInitError::FileEmpty { path: expanded });
    }
    authorized_keys_user_data(&content)
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
