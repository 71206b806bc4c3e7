//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::manager::ManagerError;

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required form field is absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// The manager rejected or failed the operation.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl ApiError {
    /// Returns the HTTP status reported for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingField(_)
            | Self::Manager(ManagerError::InvalidName | ManagerError::InvalidAddress(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Manager(ManagerError::InstanceNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Manager(ManagerError::InstanceExists { .. }) => StatusCode::CONFLICT,
            Self::Manager(ManagerError::AddressUnresolved { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Manager(
                ManagerError::Provisioning { .. }
                | ManagerError::RemoteConfiguration(_)
                | ManagerError::Directory(_)
                | ManagerError::Task(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
