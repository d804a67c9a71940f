//! Rejects clients whose resolved IP isn't on `whitelisted_ips` (spec §11
//! step 3), grounded in the client-IP resolution order used throughout
//! `riptide_api::middleware` (`X-Forwarded-For` first hop, then `X-Real-IP`).

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::net::SocketAddr;

use crate::state::AppState;

pub fn resolve_client_ip(request: &Request) -> String {
    if let Some(xff) = request.headers().get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let candidate = first.trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }
    if let Some(real_ip) = request.headers().get("X-Real-IP").and_then(|h| h.to_str().ok()) {
        return real_ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_default()
}

pub async fn ip_whitelist_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.config.whitelisted_ips.is_empty() {
        return next.run(request).await;
    }

    let client_ip = resolve_client_ip(&request);
    if state.config.whitelisted_ips.iter().any(|ip| ip == &client_ip) {
        return next.run(request).await;
    }

    tracing::warn!(client_ip, "client ip not on whitelist");
    (
        StatusCode::FORBIDDEN,
        axum::Json(json!({
            "error": { "type": "forbidden", "message": "client ip not whitelisted", "retryable": false }
        })),
    )
        .into_response()
}
