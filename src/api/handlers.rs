//! Request handlers.

use axum::Form;
use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::{ApiError, SharedManager};
use crate::backend::InstanceState;
use crate::manager::InstanceInfo;

#[derive(Debug, Default, Deserialize)]
pub(super) struct AddInstanceForm {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct BindForm {
    #[serde(rename = "app-host")]
    app_host: Option<String>,
}

/// Missing or malformed form bodies are treated as empty forms so the
/// required-field check reports them.
fn form_or_default<T: Default>(form: Result<Form<T>, FormRejection>) -> T {
    form.map(|Form(inner)| inner).unwrap_or_default()
}

pub(super) async fn add_instance(
    State(manager): State<SharedManager>,
    form: Result<Form<AddInstanceForm>, FormRejection>,
) -> Result<StatusCode, ApiError> {
    let name = form_or_default(form).name.unwrap_or_default();
    manager.add_instance(&name).await?;
    Ok(StatusCode::CREATED)
}

pub(super) async fn remove_instance(
    State(manager): State<SharedManager>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    manager.remove_instance(&name).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn bind_app(
    State(manager): State<SharedManager>,
    Path(name): Path<String>,
    form: Result<Form<BindForm>, FormRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let app_host = form_or_default(form)
        .app_host
        .filter(|host| !host.trim().is_empty())
        .ok_or(ApiError::MissingField("app-host"))?;
    manager.bind(&name, &app_host).await?;
    Ok((StatusCode::CREATED, Json(serde_json::Value::Null)))
}

pub(super) async fn unbind_app(
    State(manager): State<SharedManager>,
    Path(name): Path<String>,
    form: Result<Form<BindForm>, FormRejection>,
) -> Result<StatusCode, ApiError> {
    let app_host = form_or_default(form).app_host.unwrap_or_default();
    manager.unbind(&name, &app_host).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn instance_info(
    State(manager): State<SharedManager>,
    Path(name): Path<String>,
) -> Result<Json<InstanceInfo>, ApiError> {
    Ok(Json(manager.info(&name).await?))
}

pub(super) async fn instance_status(
    State(manager): State<SharedManager>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let health = manager.is_ok(&name).await?;
    let response = match health.state {
        InstanceState::Running => StatusCode::NO_CONTENT.into_response(),
        InstanceState::Pending => StatusCode::ACCEPTED.into_response(),
        InstanceState::Stopped | InstanceState::Error(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, health.message).into_response()
        }
    };
    Ok(response)
}
