//! Cloud-init user-data helpers for the Scaleway backend.
//!
//! Scaleway exposes instance user-data as a per-server key/value store. When
//! the key is set to `cloud-init`, the value is consumed by cloud-init on the
//! instance's first boot, so it is written while the server is still stopped.

use super::lifecycle::{HTTP_CLIENT, SCALEWAY_INSTANCE_API_BASE};
use super::types::Zone;
use super::{ScalewayBackend, ScalewayBackendError};

/// Reserved user-data key that Scaleway recognises for cloud-init payloads.
pub(crate) const CLOUD_INIT_USER_DATA_KEY: &str = "cloud-init";

pub(crate) fn user_data_url(zone: &str, server_id: &str, key: &str) -> String {
    format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers/{server_id}/user_data/{key}")
}

impl ScalewayBackend {
    pub(in crate::scaleway) async fn upload_user_data(
        &self,
        zone: &Zone,
        server_id: &str,
        payload: &str,
    ) -> Result<(), ScalewayBackendError> {
        let upload_error = |message: String| ScalewayBackendError::UserDataUpload {
            instance_id: server_id.to_owned(),
            message,
        };

        let response = HTTP_CLIENT
            .patch(user_data_url(
                zone.as_str(),
                server_id,
                CLOUD_INIT_USER_DATA_KEY,
            ))
            .header("X-Auth-Token", &self.config.secret_key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload.to_owned())
            .send()
            .await
            .map_err(|err| upload_error(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(upload_error(format!("{status}: {body}")))
    }
}
