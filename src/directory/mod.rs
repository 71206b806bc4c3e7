//! Directory of provisioned service instances.
//!
//! Maps a service-instance name to the cloud resource backing it and the
//! address the broker reaches it on. The address is filled in lazily the first
//! time a binding needs it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;

pub use file::FileDirectory;

/// A provisioned proxy instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServiceInstance {
    /// Unique service-instance name chosen by the caller.
    pub name: String,
    /// Provider identifier of the backing server.
    pub resource_id: String,
    /// Zone the backing server lives in.
    pub zone: String,
    /// Address used for remote configuration, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Errors raised by instance directories.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DirectoryError {
    /// No instance is stored under the name.
    #[error("instance {name} not found")]
    NotFound {
        /// Requested name.
        name: String,
    },
    /// An instance is already stored under the name.
    #[error("instance {name} already exists")]
    AlreadyExists {
        /// Conflicting name.
        name: String,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the stored document cannot be parsed or rendered.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the document.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the directory path cannot name a file.
    #[error("invalid directory path {path}: {message}")]
    InvalidStructure {
        /// Offending path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Persistence for service instances keyed by name.
pub trait InstanceDirectory: Send + Sync {
    /// Stores a new instance.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AlreadyExists`] when the name is taken.
    fn store(&self, instance: ServiceInstance) -> Result<(), DirectoryError>;

    /// Looks up an instance by name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when no instance has the name.
    fn retrieve(&self, name: &str) -> Result<ServiceInstance, DirectoryError>;

    /// Caches the resolved address of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when no instance has the name.
    fn record_address(&self, name: &str, address: &str) -> Result<(), DirectoryError>;

    /// Removes an instance, returning the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when no instance has the name.
    fn remove(&self, name: &str) -> Result<ServiceInstance, DirectoryError>;

    /// Lists every stored instance ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store cannot be read.
    fn list(&self) -> Result<Vec<ServiceInstance>, DirectoryError>;
}

/// Entries keyed by instance name, shared by both directory implementations.
pub(crate) type Entries = BTreeMap<String, ServiceInstance>;

pub(crate) fn insert_entry(
    entries: &mut Entries,
    instance: ServiceInstance,
) -> Result<(), DirectoryError> {
    if entries.contains_key(&instance.name) {
        return Err(DirectoryError::AlreadyExists {
            name: instance.name,
        });
    }
    entries.insert(instance.name.clone(), instance);
    Ok(())
}

pub(crate) fn entry_mut<'a>(
    entries: &'a mut Entries,
    name: &str,
) -> Result<&'a mut ServiceInstance, DirectoryError> {
    entries.get_mut(name).ok_or_else(|| DirectoryError::NotFound {
        name: name.to_owned(),
    })
}

pub(crate) fn remove_entry(
    entries: &mut Entries,
    name: &str,
) -> Result<ServiceInstance, DirectoryError> {
    entries.remove(name).ok_or_else(|| DirectoryError::NotFound {
        name: name.to_owned(),
    })
}

/// Directory kept in process memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: Mutex<Entries>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InstanceDirectory for MemoryDirectory {
    fn store(&self, instance: ServiceInstance) -> Result<(), DirectoryError> {
        insert_entry(&mut self.entries(), instance)
    }

    fn retrieve(&self, name: &str) -> Result<ServiceInstance, DirectoryError> {
        self.entries()
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                name: name.to_owned(),
            })
    }

    fn record_address(&self, name: &str, address: &str) -> Result<(), DirectoryError> {
        let mut entries = self.entries();
        let entry = entry_mut(&mut entries, name)?;
        entry.address = Some(address.to_owned());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<ServiceInstance, DirectoryError> {
        remove_entry(&mut self.entries(), name)
    }

    fn list(&self) -> Result<Vec<ServiceInstance>, DirectoryError> {
        Ok(self.entries().values().cloned().collect())
    }
}
