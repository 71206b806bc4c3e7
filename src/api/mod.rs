//! REST control plane.
//!
//! Routes map one-to-one onto [`Manager`] operations. Error bodies are plain
//! text; the status code carries the error kind.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::manager::Manager;

mod error;
mod handlers;

pub use error::ApiError;

/// Manager shared by every request handler.
pub type SharedManager = Arc<dyn Manager>;

/// Builds the broker router over `manager`.
///
/// ```text
/// POST   /resources                  add an instance (form: name)
/// DELETE /resources/{name}           remove an instance
/// POST   /resources/{name}/bind-app  bind an application (form: app-host)
/// DELETE /resources/{name}/bind-app  unbind the application
/// GET    /resources/{name}           describe an instance
/// GET    /resources/{name}/status    report instance health
/// ```
pub fn router(manager: SharedManager) -> Router {
    Router::new()
        .route("/resources", post(handlers::add_instance))
        .route(
            "/resources/{name}",
            get(handlers::instance_info).delete(handlers::remove_instance),
        )
        .route(
            "/resources/{name}/bind-app",
            post(handlers::bind_app).delete(handlers::unbind_app),
        )
        .route("/resources/{name}/status", get(handlers::instance_status))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}
