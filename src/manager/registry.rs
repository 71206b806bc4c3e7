//! Name-to-constructor registry for managers.
//!
//! The registry is an ordinary value built at start-up. `main` resolves the
//! configured manager once and hands the result to the REST layer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{CloudManager, Manager};
use crate::binding::VclWriter;
use crate::cloud_init::authorized_keys_user_data_from_file;
use crate::config::{BrokerConfig, DEFAULT_MANAGER, ScalewayConfig};
use crate::directory::{FileDirectory, MemoryDirectory};
use crate::remote::{SshConfig, SshExecutor};
use crate::scaleway::ScalewayBackend;

/// Configuration handed to manager factories.
#[derive(Clone, Debug)]
pub struct ManagerContext {
    /// Broker settings.
    pub broker: BrokerConfig,
    /// SSH settings for reaching instances.
    pub ssh: SshConfig,
}

/// Constructor registered under a manager name.
pub type ManagerFactory =
    Box<dyn Fn(&ManagerContext) -> Result<Arc<dyn Manager>, RegistryError> + Send + Sync>;

/// Errors raised by [`ManagerRegistry`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    /// A factory already exists under the name and override was not asked.
    #[error("Manager already registered")]
    AlreadyRegistered {
        /// Conflicting name.
        name: String,
    },
    /// No factory exists under the name.
    #[error("{name} is not a valid manager")]
    Unknown {
        /// Requested name.
        name: String,
    },
    /// The factory failed to build its manager.
    #[error("failed to build manager {name}: {message}")]
    Build {
        /// Manager name.
        name: String,
        /// Underlying error text.
        message: String,
    },
}

/// Maps manager names to factories.
#[derive(Default)]
pub struct ManagerRegistry {
    factories: BTreeMap<String, ManagerFactory>,
}

impl fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ManagerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in managers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(DEFAULT_MANAGER.to_owned(), Box::new(build_scaleway_manager));
        registry
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when the name is taken and
    /// `override_existing` is `false`.
    pub fn register<F>(
        &mut self,
        name: &str,
        factory: F,
        override_existing: bool,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&ManagerContext) -> Result<Arc<dyn Manager>, RegistryError> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) && !override_existing {
            return Err(RegistryError::AlreadyRegistered {
                name: name.to_owned(),
            });
        }
        self.factories.insert(name.to_owned(), Box::new(factory));
        Ok(())
    }

    /// Lists registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the manager registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] for unregistered names and
    /// [`RegistryError::Build`] when the factory fails.
    pub fn build(
        &self,
        name: &str,
        context: &ManagerContext,
    ) -> Result<Arc<dyn Manager>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::Unknown {
                name: name.to_owned(),
            })?;
        factory(context)
    }
}

fn build_error(message: &impl fmt::Display) -> RegistryError {
    RegistryError::Build {
        name: DEFAULT_MANAGER.to_owned(),
        message: message.to_string(),
    }
}

fn build_scaleway_manager(context: &ManagerContext) -> Result<Arc<dyn Manager>, RegistryError> {
    let scaleway = ScalewayConfig::load_without_cli_args().map_err(|err| build_error(&err))?;
    let user_data = context
        .broker
        .authorized_key_file
        .as_deref()
        .map(authorized_keys_user_data_from_file)
        .transpose()
        .map_err(|err| build_error(&err))?;
    let defaults = scaleway.request_defaults(user_data);
    let backend = ScalewayBackend::new(scaleway).map_err(|err| build_error(&err))?;
    let executor =
        SshExecutor::with_process_runner(context.ssh.clone()).map_err(|err| build_error(&err))?;
    let writer = VclWriter::new(executor, context.broker.proxy_settings());

    let manager: Arc<dyn Manager> = match context.broker.directory_file() {
        Some(path) => Arc::new(CloudManager::new(
            backend,
            FileDirectory::new(path),
            writer,
            defaults,
        )),
        None => Arc::new(CloudManager::new(
            backend,
            MemoryDirectory::new(),
            writer,
            defaults,
        )),
    };
    Ok(manager)
}
