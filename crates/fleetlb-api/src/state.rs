//! Application state shared across handlers and middleware, grounded in the
//! teacher's `riptide_api::state::AppState` (config + core services + metrics,
//! cloned cheaply into every handler via `axum::extract::State`).

use std::num::NonZeroU32;
use std::sync::Arc;

use axum_prometheus::metrics_exporter_prometheus::PrometheusHandle;
use dashmap::DashMap;
use fleetlb_config::AppConfig;
use fleetlb_monitoring::FleetMetrics;
use fleetlb_reliability::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

/// One token bucket per client IP, capacity = burst, refill = rate/60 per
/// second (spec §5 Rate limiting).
pub type IpRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub core: Arc<fleetlb_core::State>,
    pub metrics: Arc<FleetMetrics>,
    pub transport_metrics: PrometheusHandle,
    pub http_client: reqwest::Client,
    pub rate_limiter: Arc<IpRateLimiter>,
    /// One breaker per worker, guarding the reverse proxy's upstream calls so
    /// a worker that is failing every request stops being hammered while its
    /// sticky/admission state catches up (lazily created on first forward).
    pub upstream_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        core: Arc<fleetlb_core::State>,
        metrics: Arc<FleetMetrics>,
        transport_metrics: PrometheusHandle,
    ) -> Self {
        let per_second = (config.rate_limit_per_minute.max(1) as f64 / 60.0).ceil() as u32;
        let quota = Quota::per_second(NonZeroU32::new(per_second.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(config.effective_rate_limit_burst().max(1)).unwrap());

        Self {
            config,
            core,
            metrics,
            transport_metrics,
            http_client: reqwest::Client::builder()
                .build()
                .expect("failed to build reverse-proxy HTTP client"),
            rate_limiter: Arc::new(RateLimiter::keyed(quota)),
            upstream_breakers: Arc::new(DashMap::new()),
        }
    }

    /// Returns the breaker for `worker_id`, creating one with the default
    /// configuration on first use.
    pub fn breaker_for(&self, worker_id: &str) -> Arc<CircuitBreaker> {
        self.upstream_breakers
            .entry(worker_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())))
            .clone()
    }
}
