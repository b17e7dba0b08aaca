//! REST control routes.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use speaker_client::DeviceInfo;
use tracing::info;

use super::WebState;
use crate::error::{AppError, err};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected: bool,
    pub in_standby: bool,
    pub device: Option<DeviceInfo>,
    pub clients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceChangeResponse {
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub source: String,
}

pub async fn get_status(State(state): State<WebState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: state.sessions.is_connected().await,
        in_standby: state.sessions.is_in_standby(),
        device: state.sessions.active_device().await,
        clients: state.hub.client_count(),
    })
}

pub async fn put_device(
    State(state): State<WebState>,
    body: Result<Json<DeviceInfo>, JsonRejection>,
) -> Result<Json<DeviceChangeResponse>, AppError> {
    let Json(mut device) = body.map_err(|e| err::parse(e.body_text()))?;
    device.address = device.address.trim().to_string();
    if device.address.is_empty() {
        crate::bail_app!(Validation, "address must not be empty");
    }
    info!(address = %device.address, "Active speaker change requested");
    let changed = state.sessions.set_active_device(device).await;
    Ok(Json(DeviceChangeResponse { changed }))
}

pub async fn post_source(
    State(state): State<WebState>,
    body: Result<Json<SourceRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(request) = body.map_err(|e| err::parse(e.body_text()))?;
    let source = request.source.trim();
    if source.is_empty() {
        return Err(err::validation("source must not be empty"));
    }
    state.sessions.set_source(source).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_standby(State(state): State<WebState>) -> StatusCode {
    state.sessions.notify_standby();
    StatusCode::NO_CONTENT
}

pub async fn post_wake(State(state): State<WebState>) -> StatusCode {
    state.sessions.notify_wake();
    StatusCode::NO_CONTENT
}
