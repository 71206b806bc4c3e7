//! Server lookup, state mapping and teardown for the Scaleway backend.

use tracing::info;

use crate::backend::{InstanceHandle, InstanceState, InstanceStatus};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

const TERMINATE: &str = "terminate";

/// Maps a Scaleway server state onto the broker's lifecycle states.
pub(in crate::scaleway) fn instance_state(raw: &str) -> InstanceState {
    match raw {
        "running" => InstanceState::Running,
        "starting" => InstanceState::Pending,
        "stopped" | "stopped in place" | "stopping" => InstanceState::Stopped,
        other => InstanceState::Error(other.to_owned()),
    }
}

impl InstanceSnapshot {
    pub(in crate::scaleway) fn status(&self) -> InstanceStatus {
        InstanceStatus {
            state: instance_state(self.state.as_str()),
            address: self
                .public_ip
                .as_deref()
                .filter(|ip| !ip.trim().is_empty())
                .map(str::to_owned),
        }
    }
}

impl ScalewayBackend {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        handle: &InstanceHandle,
    ) -> Result<Option<InstanceSnapshot>, ScalewayBackendError> {
        let mut servers = self
            .api
            .list_instances(&handle.zone)
            .servers(&handle.id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from))
    }

    /// Removes a server together with its volumes and IP when the provider
    /// allows `terminate`, falling back to a plain delete.
    pub(in crate::scaleway) async fn teardown(
        &self,
        handle: &InstanceHandle,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.allows(TERMINATE) {
            self.api
                .perform_instance_action_async(&handle.zone, &handle.id, TERMINATE)
                .await?;
        } else {
            self.api
                .delete_instance_async(&handle.zone, &handle.id)
                .await?;
        }
        info!(server_id = %handle.id, zone = %handle.zone, "server removed");
        Ok(())
    }
}
