//! Authoring level routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::{Value, json};

use super::error::ApiError;
use super::raw_json;
use crate::service::Studio;

pub async fn list(State(studio): State<Studio>) -> Result<Json<Value>, ApiError> {
    let levels = studio.levels().list().await?;
    Ok(Json(json!({ "ok": true, "levels": levels })))
}

pub async fn read(
    State(studio): State<Studio>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let text = studio.levels().read(&name).await?;
    Ok(raw_json(text))
}

pub async fn save(
    State(studio): State<Studio>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let file = studio.levels().write(&name, &body).await?;
    Ok(Json(json!({ "ok": true, "saved": file })))
}

pub async fn publish(
    State(studio): State<Studio>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let file = studio.publisher().publish(&name).await?;
    Ok(Json(json!({ "ok": true, "file": file })))
}
