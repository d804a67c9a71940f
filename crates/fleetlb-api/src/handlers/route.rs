//! `POST /route` (spec §4.F Routing Front-End).

use axum::extract::{Request, State};
use axum::Json;
use fleetlb_types::model::now_ms;
use fleetlb_types::wire::{RoutingRequest, RoutingResponse};

use crate::errors::ApiError;
use crate::middleware::ip_whitelist::resolve_client_ip;
use crate::state::AppState;

pub async fn route(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<RoutingResponse>, ApiError> {
    let sticky_header = state.config.sticky_header.clone();
    let sticky_by_ip = state.config.sticky_by_ip;

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.config.max_request_body_bytes)
        .await
        .map_err(|e| fleetlb_types::FleetError::bad_request(format!("failed to read body: {e}")))?;
    let req: RoutingRequest = serde_json::from_slice(&bytes).map_err(fleetlb_types::FleetError::from)?;

    let client_ip = if !req.client_ip.is_empty() {
        req.client_ip.clone()
    } else {
        resolve_client_ip_from_parts(&parts)
    };

    let session_id = session_id_for(&parts, sticky_header.as_deref(), sticky_by_ip, &client_ip);
    let req_id = format!("{}-{}", now_ms(), session_id);

    let started = std::time::Instant::now();
    let result = state.core.select_worker(&session_id, &req.tier, req.client_lat, req.client_lon, &req_id).await;
    let elapsed = started.elapsed().as_secs_f64();

    let selected = match result {
        Ok(selected) => {
            state.metrics.observe_route(&req.tier, "ok", elapsed);
            selected
        }
        Err(err) => {
            state.metrics.observe_route(&req.tier, err.error_type(), elapsed);
            return Err(err.into());
        }
    };

    Ok(Json(RoutingResponse {
        worker_id: selected.worker_id,
        endpoint: selected.endpoint,
        hostname: selected.hostname,
        distance_km: selected.distance_km,
    }))
}

fn resolve_client_ip_from_parts(parts: &axum::http::request::Parts) -> String {
    if let Some(xff) = parts.headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let candidate = first.trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }
    parts
        .headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default()
}

fn session_id_for(
    parts: &axum::http::request::Parts,
    sticky_header: Option<&str>,
    sticky_by_ip: bool,
    client_ip: &str,
) -> String {
    if let Some(header) = sticky_header {
        if let Some(v) = parts.headers.get(header).and_then(|h| h.to_str().ok()) {
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    if sticky_by_ip {
        return client_ip.to_string();
    }
    String::new()
}
