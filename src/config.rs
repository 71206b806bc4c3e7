//! Configuration loading via `ortho-config`.
//!
//! Two layers feed the broker: [`BrokerConfig`] for the service itself and
//! [`ScalewayConfig`] for the default provisioning request. SSH settings live
//! beside the executor in [`crate::remote::SshConfig`].

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::{InstanceRequest, InstanceRequestBuilder};
use crate::binding::{DEFAULT_SERVICE_NAME, DEFAULT_VCL_PATH, ProxySettings};

/// Name of the broker configuration file.
pub const CONFIG_FILE_NAME: &str = "varnish-broker.toml";

/// Manager used when none is configured.
pub const DEFAULT_MANAGER: &str = "scaleway";

/// Scaleway specific configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Preferred availability zone. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Commercial type for new proxy instances.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Image label of the proxy image. The image must ship Varnish and grant
    /// the SSH user passwordless `sudo`.
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in {CONFIG_FILE_NAME}",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("varnish-broker")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns a request builder preloaded with every default except the
    /// service-instance name.
    #[must_use]
    pub fn request_defaults(&self, user_data: Option<String>) -> InstanceRequestBuilder {
        InstanceRequest::builder()
            .image_label(&self.default_image)
            .instance_type(&self.default_instance_type)
            .zone(&self.default_zone)
            .project_id(&self.default_project_id)
            .organisation_id(self.default_organization_id.clone())
            .architecture(&self.default_architecture)
            .user_data(user_data)
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_image,
            &FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image", "scaleway"),
        )?;
        require_field(
            &self.default_instance_type,
            &FieldMetadata::new(
                "instance type",
                "SCW_DEFAULT_INSTANCE_TYPE",
                "default_instance_type",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new(
                "availability zone",
                "SCW_DEFAULT_ZONE",
                "default_zone",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_architecture,
            &FieldMetadata::new(
                "CPU architecture",
                "SCW_DEFAULT_ARCHITECTURE",
                "default_architecture",
                "scaleway",
            ),
        )?;
        Ok(())
    }
}

/// Service-level settings for the broker.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BROKER",
    discovery(
        app_name = "varnish-broker",
        env_var = "VARNISH_BROKER_CONFIG_PATH",
        config_file_name = "varnish-broker.toml",
        dotfile_name = ".varnish-broker.toml",
        project_file_name = "varnish-broker.toml"
    )
)]
pub struct BrokerConfig {
    /// Socket address the REST API listens on.
    #[ortho_config(default = "127.0.0.1:8000".to_owned())]
    pub listen: String,
    /// Registry key of the manager serving requests.
    #[ortho_config(default = DEFAULT_MANAGER.to_owned())]
    pub manager: String,
    /// JSON file holding the instance directory. Instances are kept in
    /// memory when unset.
    pub directory_path: Option<String>,
    /// Location of the VCL file on proxy instances.
    #[ortho_config(default = DEFAULT_VCL_PATH.to_owned())]
    pub vcl_path: String,
    /// Service name reloaded after the VCL changes.
    #[ortho_config(default = DEFAULT_SERVICE_NAME.to_owned())]
    pub proxy_service: String,
    /// Public key installed on new instances through cloud-init so the broker
    /// can reach them over SSH.
    pub authorized_key_file: Option<String>,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[ortho_config(default = "info".to_owned())]
    pub log_filter: String,
}

impl BrokerConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("varnish-broker")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that required settings are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and file key to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.listen,
            &FieldMetadata::new("listen address", "BROKER_LISTEN", "listen", "broker"),
        )?;
        require_field(
            &self.manager,
            &FieldMetadata::new("manager name", "BROKER_MANAGER", "manager", "broker"),
        )?;
        require_field(
            &self.vcl_path,
            &FieldMetadata::new("VCL path", "BROKER_VCL_PATH", "vcl_path", "broker"),
        )?;
        require_field(
            &self.proxy_service,
            &FieldMetadata::new(
                "proxy service name",
                "BROKER_PROXY_SERVICE",
                "proxy_service",
                "broker",
            ),
        )?;
        if let Some(path) = self.directory_path.as_deref() {
            require_field(
                path,
                &FieldMetadata::new(
                    "directory path",
                    "BROKER_DIRECTORY_PATH",
                    "directory_path",
                    "broker",
                ),
            )?;
        }
        Ok(())
    }

    /// Returns the proxy settings used for bind and unbind commands.
    #[must_use]
    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            vcl_path: self.vcl_path.clone(),
            service_name: self.proxy_service.clone(),
        }
    }

    /// Returns the instance directory file, if one is configured.
    #[must_use]
    pub fn directory_file(&self) -> Option<Utf8PathBuf> {
        self.directory_path.as_deref().map(Utf8PathBuf::from)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
