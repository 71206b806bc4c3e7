//! Manager that provisions proxies on a cloud backend and configures them
//! over SSH.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info};

use super::{Health, InstanceInfo, Manager, ManagerError, ManagerFuture};
use crate::backend::{Backend, InstanceHandle, InstanceRequestBuilder};
use crate::binding::{BindError, VclWriter};
use crate::directory::{DirectoryError, InstanceDirectory, ServiceInstance};
use crate::remote::RemoteExecutor;
use crate::vcl::validate_host;

/// One async mutex per instance name. Operations on the same name run one
/// at a time; different names do not contend.
///
/// An entry lives only while some task holds or waits for it.
#[derive(Debug, Default)]
struct InstanceLocks {
    locks: Mutex<HashMap<String, LockEntry>>,
}

#[derive(Debug)]
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

impl InstanceLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self, name: &str) -> InstanceGuard<'_> {
        let lock = {
            let mut table = self.table();
            let entry = table
                .entry(name.to_owned())
                .or_insert_with(|| LockEntry {
                    lock: Arc::default(),
                    users: 0,
                });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };
        // Registered before waiting so a cancelled waiter still releases.
        let mut held = InstanceGuard {
            locks: self,
            name: name.to_owned(),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    fn release(&self, name: &str) {
        let mut table = self.table();
        let unused = table.get_mut(name).is_some_and(|entry| {
            entry.users = entry.users.saturating_sub(1);
            entry.users == 0
        });
        if unused {
            table.remove(name);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

/// Holds the lock for one instance name and prunes the table on drop.
struct InstanceGuard<'a> {
    locks: &'a InstanceLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.name);
    }
}

/// Manager composing a [`Backend`], an [`InstanceDirectory`] and a
/// [`VclWriter`].
pub struct CloudManager<B, D, X> {
    backend: B,
    directory: D,
    writer: Arc<VclWriter<X>>,
    defaults: InstanceRequestBuilder,
    locks: InstanceLocks,
}

impl<B, D, X> CloudManager<B, D, X>
where
    B: Backend,
    D: InstanceDirectory,
    X: RemoteExecutor + 'static,
{
    /// Creates a manager. `defaults` supplies every field of the creation
    /// request except the instance name.
    #[must_use]
    pub fn new(
        backend: B,
        directory: D,
        writer: VclWriter<X>,
        defaults: InstanceRequestBuilder,
    ) -> Self {
        Self {
            backend,
            directory,
            writer: Arc::new(writer),
            defaults,
            locks: InstanceLocks::default(),
        }
    }

    /// Returns the instance directory.
    #[must_use]
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    /// Number of instance names with a live lock entry.
    #[cfg(test)]
    pub(super) fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    fn provisioning(name: &str, operation: &str, err: &impl std::error::Error) -> ManagerError {
        error!(instance = name, operation, error = %err, "provisioning failed");
        ManagerError::Provisioning {
            message: err.to_string(),
        }
    }

    /// Stores the instance under the trimmed name, the same name the backend
    /// tags the server with.
    async fn create(&self, requested: &str) -> Result<(), ManagerError> {
        let name = requested.trim();
        if name.is_empty() {
            return Err(ManagerError::InvalidName);
        }
        let _guard = self.locks.acquire(name).await;
        match self.directory.retrieve(name) {
            Ok(_) => {
                return Err(ManagerError::InstanceExists {
                    name: name.to_owned(),
                });
            }
            Err(DirectoryError::NotFound { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        let request = self
            .defaults
            .clone()
            .name(name)
            .build()
            .map_err(|err| Self::provisioning(name, "create", &err))?;
        let handle = self
            .backend
            .create(&request)
            .await
            .map_err(|err| Self::provisioning(name, "create", &err))?;

        self.directory.store(ServiceInstance {
            name: name.to_owned(),
            resource_id: handle.id,
            zone: handle.zone,
            address: None,
        })?;
        info!(instance = name, "instance added");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ManagerError> {
        let _guard = self.locks.acquire(name).await;
        let instance = self.directory.retrieve(name)?;
        self.backend
            .destroy(InstanceHandle {
                id: instance.resource_id,
                zone: instance.zone,
            })
            .await
            .map_err(|err| Self::provisioning(name, "destroy", &err))?;
        self.directory.remove(name)?;
        info!(instance = name, "instance removed");
        Ok(())
    }

    /// Returns the cached address or asks the backend and caches the answer.
    async fn resolve_address(&self, name: &str) -> Result<String, ManagerError> {
        let instance = self.directory.retrieve(name)?;
        if let Some(address) = instance.address.filter(|address| !address.trim().is_empty()) {
            return Ok(address);
        }

        let handle = InstanceHandle {
            id: instance.resource_id,
            zone: instance.zone,
        };
        let status = self
            .backend
            .describe(&handle)
            .await
            .map_err(|err| Self::provisioning(name, "describe", &err))?
            .ok_or_else(|| ManagerError::InstanceNotFound {
                name: name.to_owned(),
            })?;
        let address = status
            .address
            .filter(|address| !address.trim().is_empty())
            .ok_or_else(|| ManagerError::AddressUnresolved {
                name: name.to_owned(),
            })?;

        self.directory.record_address(name, &address)?;
        Ok(address)
    }

    async fn configure<F>(&self, name: &str, change: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&VclWriter<X>, &str) -> Result<(), BindError> + Send + 'static,
    {
        let _guard = self.locks.acquire(name).await;
        let address = self.resolve_address(name).await?;
        let writer = Arc::clone(&self.writer);
        let outcome = tokio::task::spawn_blocking(move || change(&writer, &address))
            .await
            .map_err(|err| ManagerError::Task(err.to_string()))?;

        outcome.map_err(|err| match err {
            BindError::InvalidAddress(address_err) => ManagerError::Provisioning {
                message: format!("instance address rejected: {address_err}"),
            },
            remote @ BindError::RemoteConfiguration { .. } => {
                ManagerError::RemoteConfiguration(remote)
            }
        })
    }

    async fn describe_health(&self, name: &str) -> Result<Health, ManagerError> {
        let instance = self.directory.retrieve(name)?;
        let handle = InstanceHandle {
            id: instance.resource_id,
            zone: instance.zone,
        };
        let status = self
            .backend
            .describe(&handle)
            .await
            .map_err(|err| Self::provisioning(name, "describe", &err))?
            .ok_or_else(|| ManagerError::InstanceNotFound {
                name: name.to_owned(),
            })?;
        Ok(Health::from_state(status.state))
    }
}

impl<B, D, X> Manager for CloudManager<B, D, X>
where
    B: Backend,
    D: InstanceDirectory,
    X: RemoteExecutor + 'static,
{
    fn add_instance<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, ()> {
        Box::pin(self.create(name))
    }

    fn remove_instance<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, ()> {
        Box::pin(self.delete(name))
    }

    fn bind<'a>(&'a self, name: &'a str, app_host: &'a str) -> ManagerFuture<'a, ()> {
        Box::pin(async move {
            validate_host(app_host)?;
            let target = app_host.to_owned();
            self.configure(name, move |writer, address| writer.bind(address, &target))
                .await?;
            info!(instance = name, "instance bound");
            Ok(())
        })
    }

    fn unbind<'a>(&'a self, name: &'a str, _app_host: &'a str) -> ManagerFuture<'a, ()> {
        Box::pin(async move {
            self.configure(name, |writer, address| writer.unbind(address))
                .await?;
            info!(instance = name, "instance unbound");
            Ok(())
        })
    }

    fn info<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, InstanceInfo> {
        Box::pin(async move {
            let instance = self.directory.retrieve(name)?;
            Ok(InstanceInfo {
                name: instance.name,
                address: instance.address,
            })
        })
    }

    fn is_ok<'a>(&'a self, name: &'a str) -> ManagerFuture<'a, Health> {
        Box::pin(self.describe_health(name))
    }
}
