//! Bind and unbind a proxy instance to an application host.
//!
//! Binding writes the rendered VCL into the proxy's configuration file and
//! reloads the proxy service. Unbinding empties that file and leaves the
//! running proxy untouched. Each operation is one remote invocation, so it
//! either succeeds as a whole or is reported as failed.

use std::borrow::Cow;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::error;

use crate::remote::RemoteExecutor;
use crate::vcl::{AddressError, render_vcl, validate_host};

/// Default location of the proxy's VCL file.
pub const DEFAULT_VCL_PATH: &str = "/etc/varnish/default.vcl";

/// Default name of the proxy's service unit.
pub const DEFAULT_SERVICE_NAME: &str = "varnish";

/// Where the proxy keeps its configuration and how it is reloaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProxySettings {
    /// Absolute path of the VCL file on the instance.
    pub vcl_path: String,
    /// Service name passed to `service <name> reload`.
    pub service_name: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            vcl_path: DEFAULT_VCL_PATH.to_owned(),
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
        }
    }
}

/// Errors raised while binding or unbinding.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BindError {
    /// The instance address or application host failed validation.
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    /// The remote command exited with a non-zero status.
    #[error("failed to configure proxy at {instance_address}: {output}")]
    RemoteConfiguration {
        /// Address of the instance that rejected the change.
        instance_address: String,
        /// Combined output of the remote command.
        output: String,
    },
}

/// Builds proxy configuration commands and runs them through an executor.
#[derive(Clone, Debug)]
pub struct VclWriter<X> {
    executor: X,
    settings: ProxySettings,
}

impl<X: RemoteExecutor> VclWriter<X> {
    /// Creates a writer that issues commands through `executor`.
    #[must_use]
    pub const fn new(executor: X, settings: ProxySettings) -> Self {
        Self { executor, settings }
    }

    /// Points the proxy at `instance_address` to `app_host` and reloads it.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidAddress`] before contacting the instance
    /// when either address is unsafe, and
    /// [`BindError::RemoteConfiguration`] when the remote command fails.
    pub fn bind(&self, instance_address: &str, app_host: &str) -> Result<(), BindError> {
        validate_host(instance_address)?;
        let command = self.bind_command(app_host)?;
        self.apply(instance_address, &command)
    }

    /// Empties the VCL file on `instance_address`. Running this twice issues
    /// the same command twice.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidAddress`] when the instance address is
    /// unsafe and [`BindError::RemoteConfiguration`] when the remote command
    /// fails.
    pub fn unbind(&self, instance_address: &str) -> Result<(), BindError> {
        validate_host(instance_address)?;
        let command = self.unbind_command();
        self.apply(instance_address, &command)
    }

    /// Returns the remote command that installs the VCL for `app_host` and
    /// reloads the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidAddress`] when `app_host` fails
    /// validation.
    pub fn bind_command(&self, app_host: &str) -> Result<String, BindError> {
        validate_host(app_host)?;
        let script = format!(
            "echo '{vcl}' > {path} && service {service} reload",
            vcl = render_vcl(app_host),
            path = escape(Cow::from(self.settings.vcl_path.as_str())),
            service = escape(Cow::from(self.settings.service_name.as_str())),
        );
        Ok(format!("sudo bash -c \"{}\"", escape_double_quoted(&script)))
    }

    /// Returns the remote command that empties the VCL file.
    #[must_use]
    pub fn unbind_command(&self) -> String {
        let script = format!(
            "echo \"\" > {}",
            escape(Cow::from(self.settings.vcl_path.as_str()))
        );
        format!("sudo bash -c {}", escape(Cow::from(script)))
    }

    fn apply(&self, instance_address: &str, command: &str) -> Result<(), BindError> {
        let result = self.executor.execute(instance_address, command);
        if result.is_success() {
            return Ok(());
        }
        error!(
            instance_address,
            exit_code = result.exit_code,
            output = %result.output,
            "proxy configuration failed"
        );
        Err(BindError::RemoteConfiguration {
            instance_address: instance_address.to_owned(),
            output: result.output,
        })
    }
}

/// Escapes the characters that keep their meaning inside a double-quoted
/// shell word.
fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests;
