pub mod error;
pub mod levels;
pub mod release_levels;
pub mod trace;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use http::{Method, header};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::Studio;

/// Stored level text, passed through untouched.
fn raw_json(text: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        text,
    )
        .into_response()
}

pub fn build_router(studio: Studio) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/api/levels", get(levels::list))
        .route("/api/levels/{name}", get(levels::read).post(levels::save))
        .route("/api/levels/{name}/publish", post(levels::publish))
        .route("/api/release-levels", get(release_levels::list))
        .route(
            "/api/release-levels/{name}",
            get(release_levels::read).post(release_levels::save),
        )
        .route("/api/play/{name}", get(release_levels::play))
        .route("/api/trace", get(trace::latest).post(trace::run))
        .with_state(studio)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
