use axum::Json;
use axum::extract::State;
use chroma_core::trace::TraceResult;
use chroma_studio::TraceState;
use serde::Serialize;

use super::error::ApiError;
use crate::service::Studio;

#[derive(Serialize)]
pub struct TraceReply {
    ok: bool,
    #[serde(flatten)]
    result: TraceResult,
}

/// Traces the level in the request body, any supported version.
pub async fn run(State(studio): State<Studio>, body: String) -> Result<Json<TraceReply>, ApiError> {
    let result = studio.orchestrator().trace(body).await?;
    Ok(Json(TraceReply { ok: true, result }))
}

/// Outcome of the most recent trace.
pub async fn latest(State(studio): State<Studio>) -> Json<TraceState> {
    Json(studio.orchestrator().state())
}
