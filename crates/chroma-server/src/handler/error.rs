use axum::Json;
use axum::response::{IntoResponse, Response};
use chroma_studio::{ReleaseError, StoreError, TraceError};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::InvalidName(_) | StoreError::Empty => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(err) | ApiError::Release(ReleaseError::Store(err)) => store_status(err),
            ApiError::Release(ReleaseError::Level { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Release(ReleaseError::Encode(_)) | ApiError::Trace(TraceError::Encode(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Trace(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
