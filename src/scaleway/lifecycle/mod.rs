//! Instance lifecycle helpers for the Scaleway backend.

use std::sync::LazyLock;
use std::time::Duration;

mod create;
mod image;
mod status;

pub(in crate::scaleway) use create::discard_on_failure;

use crate::scaleway::types::{Action, InstanceId, ServerState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub(in crate::scaleway) const SCALEWAY_INSTANCE_API_BASE: &str =
    "https://api.scaleway.com/instance/v1";

pub(in crate::scaleway) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub(in crate::scaleway) struct InstanceSnapshot {
    pub(in crate::scaleway) id: InstanceId,
    pub(in crate::scaleway) state: ServerState,
    pub(in crate::scaleway) allowed_actions: Vec<Action>,
    pub(in crate::scaleway) public_ip: Option<String>,
}

impl From<scaleway_rs::ScalewayInstance> for InstanceSnapshot {
    fn from(server: scaleway_rs::ScalewayInstance) -> Self {
        Self {
            id: server.id.into(),
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server.public_ip.map(|ip| ip.address),
        }
    }
}

impl InstanceSnapshot {
    pub(in crate::scaleway) fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed.as_str() == action)
    }
}

#[cfg(test)]
mod tests;
