//! Router assembly (spec §6 endpoint table + §11 middleware chain). The
//! management endpoints are registered explicitly; anything else falls
//! through to the reverse proxy, gated by `proxy_endpoints` (spec §6
//! "Proxy: `proxy_endpoints: [prefix]`").

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{
    auth_middleware, ip_whitelist_middleware, rate_limit_middleware, request_validation_middleware,
    security_headers_middleware, PayloadLimitLayer,
};
use crate::proxy;
use crate::state::AppState;

/// Builds the router. `prometheus_layer` must come from the same
/// `PrometheusMetricLayer::pair()` call whose handle was placed in
/// `state.transport_metrics`, so `/metrics` reports what the layer recorded.
pub fn build_router(state: AppState, prometheus_layer: axum_prometheus::PrometheusMetricLayer<'static>) -> Router {
    let cors = if state.config.enable_cors {
        if state.config.cors_allowed_origins.is_empty() {
            CorsLayer::permissive()
        } else {
            let origins: Vec<_> = state
                .config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(origins).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
        }
    } else {
        CorsLayer::new()
    };

    let app = Router::new()
        .route("/register", post(handlers::register))
        .route("/stats", post(handlers::stats))
        .route("/route", post(handlers::route))
        .route("/health", get(handlers::health))
        .route("/clients", get(handlers::list_clients))
        .route("/clients/purge", post(handlers::purge_all))
        .route("/clients/purge-pending", post(handlers::purge_pending))
        .route("/metrics", get(metrics_handler))
        .fallback(any(maybe_proxy))
        .with_state(state.clone());

    // Outermost first: request_validation -> PayloadLimitLayer -> ip_whitelist
    // -> auth -> rate_limit -> security_headers -> cors -> catch_panic ->
    // trace -> timeout, exactly the order in SPEC_FULL.md §11.
    app.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(state.clone(), request_validation_middleware))
            .layer(PayloadLimitLayer::with_limit(state.config.max_request_body_bytes))
            .layer(middleware::from_fn_with_state(state.clone(), ip_whitelist_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), security_headers_middleware))
            .layer(cors)
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(prometheus_layer)
            .layer(TimeoutLayer::new(state.config.request_timeout())),
    )
}

/// True for the explicit management routes registered above; false for any
/// path that falls through to the `maybe_proxy` fallback. Shared with the
/// auth and request-validation middleware so both agree on what counts as a
/// proxied request (spec §6 "Proxy path is exempt").
pub(crate) fn is_management_path(path: &str) -> bool {
    matches!(
        path,
        "/register" | "/stats" | "/route" | "/health" | "/clients" | "/clients/purge" | "/clients/purge-pending" | "/metrics"
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = format!("{}{}", state.transport_metrics.render(), state.metrics.render());
    (StatusCode::OK, body).into_response()
}

/// Gates the reverse proxy behind `proxy_endpoints`: empty (or containing `/`
/// / `*`) means catch-all, otherwise only matching prefixes are proxied and
/// everything else 404s (spec §6 "Proxy").
async fn maybe_proxy(State(state): State<AppState>, request: Request) -> Response {
    let prefixes = &state.config.proxy_endpoints;
    let catch_all = prefixes.is_empty() || prefixes.iter().any(|p| p == "/" || p == "*");
    let path = request.uri().path().to_string();

    if catch_all || prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        return proxy::proxy(State(state), request).await;
    }

    StatusCode::NOT_FOUND.into_response()
}
