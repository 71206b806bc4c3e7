//! Instance creation helpers for the Scaleway backend.
//!
//! Instances are created with `stopped: true` so that cloud-init user-data
//! can be attached before the first boot.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::backend::InstanceRequest;
use crate::scaleway::types::Zone;

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::{HTTP_CLIENT, InstanceSnapshot, SCALEWAY_INSTANCE_API_BASE};

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

/// Removes a server whose start-up failed, then hands back the start-up
/// outcome. A failed removal is logged and does not replace the original
/// error.
pub(in crate::scaleway) async fn discard_on_failure<T, F, Fut>(
    server_id: &str,
    outcome: Result<T, ScalewayBackendError>,
    cleanup: F,
) -> Result<T, ScalewayBackendError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ScalewayBackendError>>,
{
    match outcome {
        Ok(value) => Ok(value),
        Err(err) => {
            match cleanup().await {
                Ok(()) => warn!(
                    server_id,
                    error = %err,
                    "removed partially created server"
                ),
                Err(cleanup_error) => error!(
                    server_id,
                    error = %err,
                    %cleanup_error,
                    "failed to remove partially created server"
                ),
            }
            Err(err)
        }
    }
}

impl ScalewayBackend {
    /// Attaches user data, when present, and boots a freshly created server.
    pub(in crate::scaleway) async fn start(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
        user_data: Option<&str>,
    ) -> Result<(), ScalewayBackendError> {
        if let Some(payload) = user_data {
            self.upload_user_data(zone, snapshot.id.as_str(), payload)
                .await?;
        }
        self.power_on_if_needed(zone, snapshot).await
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.state.as_str() == "running" {
            return Ok(());
        }

        if snapshot.allows("poweron") {
            self.api
                .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayBackendError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Creates a Scaleway server in a stopped state, tagged with the owning
    /// service instance.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError`] when the Scaleway API request fails or
    /// the provider rejects the requested instance type or image.
    pub(in crate::scaleway) async fn create_instance_stopped(
        &self,
        request: &InstanceRequest,
        image_id: &str,
    ) -> Result<scaleway_rs::ScalewayInstance, ScalewayBackendError> {
        let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers", request.zone);
        let payload = CreateServerRequest {
            name: format!("varnish-{}", Uuid::new_v4().simple()),
            commercial_type: request.instance_type.clone(),
            image: image_id.to_owned(),
            project: request.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: Self::instance_tags(&request.name),
            stopped: true,
            organization: request.organisation_id.clone(),
        };

        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: CreateServerResponse =
                serde_json::from_slice(&body).map_err(|err| ScalewayBackendError::Provider {
                    message: err.to_string(),
                })?;
            return Ok(parsed.server);
        }

        let message = String::from_utf8_lossy(&body).into_owned();
        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, request)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                instance_type: request.instance_type.clone(),
                zone: request.zone.clone(),
            });
        }

        Err(ScalewayBackendError::Provider { message })
    }
}
