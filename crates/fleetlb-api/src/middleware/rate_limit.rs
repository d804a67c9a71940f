//! Per-client-IP token bucket (spec §5 Rate limiting, §11 step 5), grounded
//! in `riptide_utils::rate_limit::SimpleRateLimiter`'s use of `governor`,
//! generalized here to a keyed limiter so each IP gets its own bucket.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::middleware::ip_whitelist::resolve_client_ip;
use crate::state::AppState;

pub async fn rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let client_ip = resolve_client_ip(&request);
    if state.rate_limiter.check_key(&client_ip).is_err() {
        tracing::warn!(client_ip, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "1")],
            axum::Json(json!({
                "error": { "type": "too_many_requests", "message": "rate limit exceeded", "retryable": true }
            })),
        )
            .into_response();
    }

    next.run(request).await
}
