//! A worker whose upstream keeps refusing connections trips its reverse-proxy
//! circuit breaker (`fleetlb_reliability::CircuitBreaker`, wired in via
//! `AppState::breaker_for`): repeated failures move it from `Closed` to
//! `Open`, while each individual request still surfaces as a 502 to the
//! client either way.

mod common;

use fleetlb_reliability::circuit_breaker::{CircuitBreakerConfig, CircuitState};

#[tokio::test]
async fn repeated_upstream_failures_trip_the_breaker() {
    let config = common::config(|_| {});
    let app = common::build_app(config);

    // Port 1 is privileged and unbound in this sandbox: every connection
    // attempt to it is refused immediately.
    app.core.register(common::worker("w-flaky", "http://127.0.0.1:1", 4));
    app.core.update_stats("w-flaky", common::stats(vec![5.0; 4], 16.0, 100.0)).unwrap();

    let attempts = CircuitBreakerConfig::default().failure_threshold;
    for _ in 0..attempts {
        let response = common::get(&app.router, "/infer", &[]).await;
        assert_eq!(response.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    assert_eq!(app.state.breaker_for("w-flaky").state(), CircuitState::Open);
}
