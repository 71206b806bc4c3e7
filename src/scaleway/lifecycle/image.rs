//! Boot image resolution for proxy instances.
//!
//! Images owned by the configured project win over public ones so operators
//! can publish a pre-baked Varnish image under the same label.

use std::future::Future;

use crate::backend::InstanceRequest;
use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};

use super::super::{ScalewayBackend, ScalewayBackendError};

const AVAILABLE: &str = "available";

impl ScalewayBackend {
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        request: &InstanceRequest,
    ) -> Result<String, ScalewayBackendError> {
        self.resolve_image_id_with(
            request,
            || self.list_project_images(request),
            || self.list_public_images(request),
        )
        .await
    }

    async fn list_project_images(
        &self,
        request: &InstanceRequest,
    ) -> Result<Vec<ScalewayImage>, ScalewayBackendError> {
        if request.project_id.is_empty() {
            return Ok(Vec::new());
        }
        let mut lookup = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
            .public(true)
            .project(&request.project_id)
            .name(&request.image_label)
            .arch(&request.architecture);
        if let Some(org) = &request.organisation_id {
            lookup = lookup.organization(org);
        }
        Ok(lookup.run_async().await?)
    }

    async fn list_public_images(
        &self,
        request: &InstanceRequest,
    ) -> Result<Vec<ScalewayImage>, ScalewayBackendError> {
        Ok(
            ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
                .public(true)
                .name(&request.image_label)
                .arch(&request.architecture)
                .run_async()
                .await?,
        )
    }

    /// Resolves the image using injectable lookups. The public lookup only
    /// runs when the project has no usable candidate.
    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        request: &InstanceRequest,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayBackendError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
    {
        let project_images = Self::usable_images(project_fetch().await?, request);
        if !project_images.is_empty() {
            return Self::newest_image_id(project_images, request);
        }
        let public_images = Self::usable_images(public_fetch().await?, request);
        Self::newest_image_id(public_images, request)
    }

    pub(in crate::scaleway) fn newest_image_id(
        candidates: Vec<ScalewayImage>,
        request: &InstanceRequest,
    ) -> Result<String, ScalewayBackendError> {
        candidates
            .into_iter()
            .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
            .map(|image| image.id)
            .ok_or_else(|| ScalewayBackendError::ImageNotFound {
                label: request.image_label.clone(),
                arch: request.architecture.clone(),
                zone: request.zone.clone(),
            })
    }

    pub(in crate::scaleway) fn usable_images(
        images: Vec<ScalewayImage>,
        request: &InstanceRequest,
    ) -> Vec<ScalewayImage> {
        images
            .into_iter()
            .filter(|image| image.arch == request.architecture && image.state == AVAILABLE)
            .collect()
    }
}
