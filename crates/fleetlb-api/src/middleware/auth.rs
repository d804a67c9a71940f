//! `X-API-Key` authentication (spec §11 step 4 / §6 "Auth"), grounded in
//! `riptide_api::middleware::auth::auth_middleware`. The reverse-proxy path
//! and `/health` are exempt, matching the spec's stated auth exemptions.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::routes::is_management_path;
use crate::state::AppState;

pub async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(server_key) = state.config.server_key.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path();
    // `/health` is explicitly exempt; every path that isn't an explicit
    // management route falls through to the reverse proxy and is exempt too.
    if path == "/health" || !is_management_path(path) {
        return next.run(request).await;
    }

    let Some(provided) = request.headers().get("X-API-Key").and_then(|h| h.to_str().ok()) else {
        tracing::warn!(path, "missing api key");
        return unauthorized("missing X-API-Key header");
    };

    if provided == server_key || state.config.api_keys.iter().any(|k| k == provided) {
        return next.run(request).await;
    }

    tracing::warn!(path, "invalid api key");
    forbidden("invalid api key")
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({ "error": { "type": "unauthorized", "message": message, "retryable": false } })),
    )
        .into_response()
}

fn forbidden(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        axum::Json(json!({ "error": { "type": "forbidden", "message": message, "retryable": false } })),
    )
        .into_response()
}
