//! Scaleway backend implementation of the proxy instance lifecycle.

mod error;
mod lifecycle;
mod types;
mod user_data;

use crate::backend::{Backend, BackendFuture, InstanceHandle, InstanceRequest, InstanceStatus};
use crate::config::ScalewayConfig;
use scaleway_rs::ScalewayApi;
use tracing::{debug, info};
use types::Zone;

pub use error::ScalewayBackendError;

/// Tag applied to every server the broker creates.
pub const BROKER_TAG: &str = "varnish-broker";

/// Prefix of the tag recording the owning service instance.
pub const SERVICE_INSTANCE_TAG_PREFIX: &str = "service-instance:";

/// Backend that provisions instances through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    config: ScalewayConfig,
}

impl ScalewayBackend {
    fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        request: &InstanceRequest,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == request.instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    /// Tags applied to the server backing service instance `name`.
    #[must_use]
    pub fn instance_tags(name: &str) -> Vec<String> {
        vec![
            String::from(BROKER_TAG),
            format!("{SERVICE_INSTANCE_TAG_PREFIX}{name}"),
        ]
    }

    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayBackendError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        })
    }
}

impl Backend for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let image_id = self.resolve_image_id(request).await?;
            let server = self.create_instance_stopped(request, &image_id).await?;
            let zone = Zone::from(request.zone.as_str());
            let snapshot = lifecycle::InstanceSnapshot::from(server);
            let handle = InstanceHandle {
                id: snapshot.id.as_str().to_owned(),
                zone: request.zone.clone(),
            };

            let started = self
                .start(&zone, &snapshot, request.user_data.as_deref())
                .await;
            lifecycle::discard_on_failure(&handle.id, started, || {
                self.teardown(&handle, &snapshot)
            })
            .await?;
            info!(
                instance = %request.name,
                server_id = %snapshot.id,
                zone = %zone,
                "server created"
            );

            Ok(handle)
        })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceStatus>, Self::Error> {
        Box::pin(async move {
            let snapshot = self.fetch_instance(handle).await?;
            Ok(snapshot.map(|server| server.status()))
        })
    }

    fn destroy(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let Some(snapshot) = self.fetch_instance(&handle).await? else {
                debug!(server_id = %handle.id, "server already gone");
                return Ok(());
            };
            self.teardown(&handle, &snapshot).await
        })
    }
}
