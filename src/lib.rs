//! Core library for the Varnish service broker.
//!
//! The broker provisions Varnish proxy instances on a cloud provider and
//! binds them to client applications. A [`manager::Manager`] composes a
//! [`backend::Backend`] for provisioning, an [`directory::InstanceDirectory`]
//! for bookkeeping and a [`binding::VclWriter`] that rewrites the proxy
//! configuration over SSH. The [`api`] module exposes managers over REST.

pub mod api;
pub mod backend;
pub mod binding;
pub mod cloud_init;
pub mod config;
pub mod directory;
pub mod manager;
pub mod remote;
pub mod scaleway;
pub mod test_support;
pub mod vcl;

pub use backend::{
    Backend, InstanceHandle, InstanceRequest, InstanceRequestBuilder, InstanceState,
    InstanceStatus,
};
pub use binding::{BindError, ProxySettings, VclWriter};
pub use config::{BrokerConfig, ConfigError, ScalewayConfig};
pub use directory::{
    DirectoryError, FileDirectory, InstanceDirectory, MemoryDirectory, ServiceInstance,
};
pub use manager::{
    CloudManager, Health, InstanceInfo, Manager, ManagerContext, ManagerError, ManagerRegistry,
    RegistryError,
};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, RemoteError,
    RemoteExecutor, SshConfig, SshExecutor, UNKNOWN_EXIT_CODE,
};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use vcl::{AddressError, render_vcl, validate_host};
