//! Player-facing level routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use chroma_studio::release_text;
use serde_json::{Value, json};

use super::error::ApiError;
use super::raw_json;
use crate::service::Studio;

pub async fn list(State(studio): State<Studio>) -> Result<Json<Value>, ApiError> {
    let levels = studio.release().list().await?;
    Ok(Json(json!({ "ok": true, "levels": levels })))
}

pub async fn read(
    State(studio): State<Studio>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let text = studio.release().read(&name).await?;
    Ok(raw_json(text))
}

/// Stores a release upload; a version-2 body loses its `dev` block first.
pub async fn save(
    State(studio): State<Studio>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let text = release_text(&body)?;
    let file = studio.release().write(&name, &text).await?;
    Ok(Json(json!({ "ok": true, "file": file })))
}

/// The level a player would get: release copy first, authoring copy as a
/// fallback, author-only data removed.
pub async fn play(
    State(studio): State<Studio>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let level = studio.publisher().load_play_level(&name).await?;
    Ok(Json(json!({ "ok": true, "level": level })))
}
