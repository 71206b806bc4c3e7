//! Service-instance managers.
//!
//! A manager owns the lifecycle of proxy instances behind the REST API:
//! provisioning, binding to applications and health reporting. Managers are
//! selected by name through [`ManagerRegistry`].

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use thiserror::Error;

use crate::backend::InstanceState;
use crate::binding::BindError;
use crate::directory::DirectoryError;
use crate::vcl::AddressError;

mod cloud;
mod registry;

pub use cloud::CloudManager;
pub use registry::{ManagerContext, ManagerFactory, ManagerRegistry, RegistryError};

/// Future returned by manager operations.
pub type ManagerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ManagerError>> + Send + 'a>>;

/// Public description of a service instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceInfo {
    /// Service-instance name.
    pub name: String,
    /// Address of the proxy, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Health of a service instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Health {
    /// Lifecycle state reported by the provider.
    pub state: InstanceState,
    /// Explanation when the instance is not running; empty otherwise.
    pub message: String,
}

impl Health {
    /// Builds the health report for `state`.
    #[must_use]
    pub fn from_state(state: InstanceState) -> Self {
        let message = match state {
            InstanceState::Running => String::new(),
            ref other => format!("Instance is {other}"),
        };
        Self { state, message }
    }

    /// Returns `true` when the instance is running.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.state == InstanceState::Running
    }
}

/// Errors raised by managers.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ManagerError {
    /// The service-instance name is blank.
    #[error("name is required")]
    InvalidName,
    /// No instance has the requested name, or its resource is gone.
    #[error("Instance not found")]
    InstanceNotFound {
        /// Requested name.
        name: String,
    },
    /// An instance with the name already exists.
    #[error("Instance {name} already exists")]
    InstanceExists {
        /// Conflicting name.
        name: String,
    },
    /// The application host cannot be embedded in the proxy configuration.
    #[error("invalid app-host: {0}")]
    InvalidAddress(#[from] AddressError),
    /// The provider has not assigned the instance an address yet.
    #[error("Instance {name} has no address yet")]
    AddressUnresolved {
        /// Instance awaiting an address.
        name: String,
    },
    /// The cloud provider rejected or failed an operation.
    #[error("provisioning failed: {message}")]
    Provisioning {
        /// Provider error text.
        message: String,
    },
    /// The proxy could not be reconfigured over SSH.
    #[error(transparent)]
    RemoteConfiguration(BindError),
    /// The instance directory failed.
    #[error("instance directory failed: {0}")]
    Directory(DirectoryError),
    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<DirectoryError> for ManagerError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::NotFound { name } => Self::InstanceNotFound { name },
            DirectoryError::AlreadyExists { name } => Self::InstanceExists { name },
            other => Self::Directory(other),
        }
    }
}

/// Operations the REST API performs on service instances.
pub trait Manager: Send + Sync {
    /// Provisions a new instance named `name`.
    fn add_instance<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, ()>;

    /// Destroys the instance named `name` and forgets it.
    fn remove_instance<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, ()>;

    /// Points the instance's proxy at `app_host`.
    fn bind<'a>(&'a self, name: &'a str, app_host: &'a str) -> ManagerFuture<'a, ()>;

    /// Clears the instance's proxy configuration.
    fn unbind<'a>(&'a self, name: &'a str, app_host: &'a str) -> ManagerFuture<'a, ()>;

    /// Describes the instance.
    fn info<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, InstanceInfo>;

    /// Reports whether the instance is able to serve.
    fn is_ok<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, Health>;
}

#[cfg(test)]
mod tests;
