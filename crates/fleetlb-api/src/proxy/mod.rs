//! Reverse proxy (spec §4.H): forwards a client request to the worker chosen
//! by `select_worker`, on whichever `EndpointRoute` best matches the request
//! path (§4.I), injecting the `X-LB-*` headers the worker uses to attribute
//! the request back to the load balancer.

mod path_match;
mod websocket;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use fleetlb_types::FleetError;

use crate::errors::ApiError;
use crate::middleware::ip_whitelist::resolve_client_ip;
use crate::state::AppState;

const HEADER_LB_CLIENT_ID: &str = "x-lb-client-id";
const HEADER_LB_HOSTNAME: &str = "x-lb-hostname";

pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    match proxy_inner(state, request).await {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let connection = headers
        .get(axum::http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    upgrade.eq_ignore_ascii_case("websocket")
        && connection.to_ascii_lowercase().split(',').any(|tok| tok.trim() == "upgrade")
}

async fn proxy_inner(state: AppState, request: Request) -> Result<Response, FleetError> {
    let client_ip = resolve_client_ip(&request);
    let path = request.uri().path().to_string();

    if is_websocket_upgrade(request.headers()) {
        let tier_name = extract_tier(&state, None, request.uri().query(), request.headers());
        let session_id = session_id_for(&state, request.headers(), &client_ip);
        let req_id = format!("{}-{}", fleetlb_types::model::now_ms(), session_id);

        let selected = state.core.select_worker(&session_id, &tier_name, None, None, &req_id).await?;
        let record = state
            .core
            .get_worker(&selected.worker_id)
            .ok_or_else(|| FleetError::unknown_worker(&selected.worker_id))?;
        let base = path_match::best_match(&record.worker.endpoint_routes, &path)
            .map(|r| r.url.as_str())
            .unwrap_or(record.worker.primary_endpoint.as_str());
        let target = build_ws_url(base, &path, request.uri().query());

        return Ok(websocket::upgrade(request, target, client_ip, record.worker.hostname.clone()).await);
    }

    let tier_field = state.config.tier_field_name.clone();
    let max_body = state.config.max_request_body_bytes;
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, max_body)
        .await
        .map_err(|_| FleetError::RequestEntityTooLarge { size: max_body + 1, limit: max_body })?;

    let body_tier = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get(&tier_field).and_then(|t| t.as_str().map(str::to_string)));
    let tier_name = extract_tier(&state, body_tier, parts.uri.query(), &parts.headers);
    let session_id = session_id_for(&state, &parts.headers, &client_ip);
    let req_id = format!("{}-{}", fleetlb_types::model::now_ms(), session_id);

    let started = std::time::Instant::now();
    let result = state.core.select_worker(&session_id, &tier_name, None, None, &req_id).await;
    let elapsed = started.elapsed().as_secs_f64();
    let selected = match result {
        Ok(selected) => {
            state.metrics.observe_route(&tier_name, "ok", elapsed);
            selected
        }
        Err(err) => {
            state.metrics.observe_route(&tier_name, err.error_type(), elapsed);
            return Err(err);
        }
    };

    let record = state
        .core
        .get_worker(&selected.worker_id)
        .ok_or_else(|| FleetError::unknown_worker(&selected.worker_id))?;
    let base = path_match::best_match(&record.worker.endpoint_routes, &path)
        .map(|r| r.url.as_str())
        .unwrap_or(record.worker.primary_endpoint.as_str());
    let target = build_http_url(base, &parts.uri);

    forward_http(&state, parts, bytes, &target, &client_ip, &record.worker.hostname, &record.worker.worker_id).await
}

fn extract_tier(state: &AppState, body_field: Option<String>, query: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(t) = body_field {
        if !t.is_empty() {
            return t;
        }
    }
    if let Some(q) = query {
        for pair in q.split('&') {
            let mut parts = pair.splitn(2, '=');
            if parts.next() == Some(state.config.tier_field_name.as_str()) {
                if let Some(value) = parts.next().filter(|v| !v.is_empty()) {
                    return value.to_string();
                }
            }
        }
    }
    if let Some(h) = headers.get(state.config.tier_header.as_str()).and_then(|v| v.to_str().ok()) {
        if !h.is_empty() {
            return h.to_string();
        }
    }
    "lite".to_string()
}

fn session_id_for(state: &AppState, headers: &HeaderMap, client_ip: &str) -> String {
    if let Some(name) = &state.config.sticky_header {
        if let Some(v) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty()) {
            return v.to_string();
        }
    }
    if state.config.sticky_by_ip {
        return client_ip.to_string();
    }
    String::new()
}

fn build_http_url(base: &str, uri: &Uri) -> String {
    let base = base.trim_end_matches('/');
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{base}{path_and_query}")
}

fn build_ws_url(base: &str, path: &str, query: Option<&str>) -> String {
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let ws_base = ws_base.trim_end_matches('/');
    match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{ws_base}{path}?{q}"),
        None => format!("{ws_base}{path}"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn forward_http(
    state: &AppState,
    parts: axum::http::request::Parts,
    bytes: Bytes,
    target: &str,
    client_ip: &str,
    hostname: &str,
    worker_id: &str,
) -> Result<Response, FleetError> {
    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| FleetError::internal(e.to_string()))?;

    let mut builder = state.http_client.request(method, target);
    for (name, value) in parts.headers.iter() {
        if matches!(name.as_str(), "host" | "content-length") {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    builder = builder
        .header(HEADER_LB_CLIENT_ID, client_ip)
        .header(HEADER_LB_HOSTNAME, hostname)
        .header("x-forwarded-for", client_ip);

    if !bytes.is_empty() {
        builder = builder.body(bytes);
    }

    let breaker = state.breaker_for(worker_id);
    let Some(permit) = breaker.try_acquire() else {
        state.metrics.record_proxy_error(worker_id);
        return Err(FleetError::upstream(worker_id, "circuit open, worker is failing repeatedly"));
    };

    let response = match builder.send().await {
        Ok(response) => {
            breaker.record_success(permit);
            response
        }
        Err(e) => {
            breaker.record_failure(permit);
            state.metrics.record_proxy_error(worker_id);
            return Err(FleetError::upstream(worker_id, e.to_string()));
        }
    };

    let status = response.status().as_u16();
    let mut response_builder = Response::builder().status(status);
    for (name, value) in response.headers().iter() {
        if matches!(name.as_str(), "content-length" | "transfer-encoding" | "connection") {
            continue;
        }
        response_builder = response_builder.header(name.as_str(), value.as_bytes());
    }

    // Once headers are returned, `TimeoutLayer` no longer bounds the response
    // body stream, so SSE/long-poll downstreams naturally outlive the request
    // timeout (spec §4.H step 8) without a separate route mount.
    let flush_ms = state.config.proxy_sse_flush_interval_ms;
    let body = match flush_ms {
        0 => {
            let full = response.bytes().await.map_err(|e| FleetError::upstream(worker_id, e.to_string()))?;
            Body::from(full)
        }
        ms if ms > 0 => throttled_body(response, Duration::from_millis(ms as u64)),
        _ => Body::from_stream(response.bytes_stream()),
    };

    response_builder.body(body).map_err(|e| FleetError::internal(e.to_string()))
}

/// Batches upstream chunks and releases them at most once per `period`,
/// implementing the positive-flush-interval branch of the streaming contract.
fn throttled_body(response: reqwest::Response, period: Duration) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut buf = BytesMut::new();
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(data)) => buf.extend_from_slice(&data),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                        return;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !buf.is_empty() {
                        let chunk = buf.split().freeze();
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
        if !buf.is_empty() {
            let chunk = buf.split().freeze();
            let _ = tx.send(Ok(chunk)).await;
        }
    });
    Body::from_stream(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_upgrade_is_detected() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::UPGRADE, "websocket".parse().unwrap());
        headers.insert(axum::http::header::CONNECTION, "keep-alive, Upgrade".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn plain_request_is_not_an_upgrade() {
        let headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn http_target_preserves_path_and_query() {
        let uri: Uri = "/v1/infer?x=1".parse().unwrap();
        assert_eq!(build_http_url("http://10.0.0.1:9000/", &uri), "http://10.0.0.1:9000/v1/infer?x=1");
    }

    #[test]
    fn ws_target_converts_scheme() {
        assert_eq!(build_ws_url("https://10.0.0.1:9443", "/stream", Some("id=1")), "wss://10.0.0.1:9443/stream?id=1");
        assert_eq!(build_ws_url("http://10.0.0.1:9000", "/stream", None), "ws://10.0.0.1:9000/stream");
    }
}
