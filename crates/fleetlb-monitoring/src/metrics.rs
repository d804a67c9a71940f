//! Hand-registered Prometheus metrics for FleetLB-specific gauges and
//! counters, in the style of the teacher's `riptide-api::metrics` module
//! (a `prometheus::Registry` wrapped by a struct of typed collectors).
//! HTTP-transport metrics (request counts/latency by route) are instead
//! produced by `axum-prometheus::PrometheusMetricLayer`, applied in the
//! API router; this struct covers the metrics that layer cannot derive on
//! its own because they reflect fleet/core state rather than transport.

use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// FleetLB's hand-registered metrics, exposed alongside the
/// `axum-prometheus` transport metrics at `GET /metrics`.
pub struct FleetMetrics {
    pub registry: Registry,

    /// `fleetlb_routes_total{tier,outcome}` — routing decisions by tier and
    /// outcome (`ok`, `no_capacity`, `unknown_tier`, `no_healthy_workers`).
    pub routes_total: IntCounterVec,

    /// `fleetlb_route_duration_seconds{tier}` — wall-clock time spent in the
    /// selection procedure (spec §4.G), excluding proxying.
    pub route_duration_seconds: HistogramVec,

    /// `fleetlb_active_workers` — count of workers currently tracked by the
    /// registry, regardless of health status.
    pub active_workers: Gauge,

    /// `fleetlb_reservations_active` — count of live pending-allocation
    /// entries across all workers, i.e. the ledger's total reservation count.
    pub reservations_active: Gauge,

    /// `fleetlb_proxy_upstream_errors_total{worker_id}` — failed proxy
    /// round-trips to a given worker (connection refused, timeout, 5xx).
    pub proxy_upstream_errors_total: CounterVec,

    /// `fleetlb_probe_duration_seconds{worker_id,kind}` — health probe
    /// round-trip time, mirroring the latency fed into each worker's EWMA.
    pub probe_duration_seconds: HistogramVec,
}

impl FleetMetrics {
    /// Builds and registers every collector against a fresh `Registry`.
    /// Panics only on a duplicate-registration bug, which would be a
    /// programming error rather than a runtime condition.
    pub fn new() -> Self {
        let registry = Registry::new();

        let routes_total = IntCounterVec::new(
            Opts::new("fleetlb_routes_total", "Routing decisions by tier and outcome"),
            &["tier", "outcome"],
        )
        .expect("valid metric opts");

        let route_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "fleetlb_route_duration_seconds",
                "Time spent selecting a worker for a routing request",
            )
            .buckets(vec![0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
            &["tier"],
        )
        .expect("valid metric opts");

        let active_workers = Gauge::new(
            "fleetlb_active_workers",
            "Number of workers currently tracked by the fleet registry",
        )
        .expect("valid metric opts");

        let reservations_active = Gauge::new(
            "fleetlb_reservations_active",
            "Number of live pending-allocation reservations across all workers",
        )
        .expect("valid metric opts");

        let proxy_upstream_errors_total = CounterVec::new(
            Opts::new(
                "fleetlb_proxy_upstream_errors_total",
                "Failed proxy round-trips to an upstream worker",
            ),
            &["worker_id"],
        )
        .expect("valid metric opts");

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "fleetlb_probe_duration_seconds",
                "Health probe round-trip duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["worker_id", "kind"],
        )
        .expect("valid metric opts");

        registry.register(Box::new(routes_total.clone())).expect("register routes_total");
        registry
            .register(Box::new(route_duration_seconds.clone()))
            .expect("register route_duration_seconds");
        registry.register(Box::new(active_workers.clone())).expect("register active_workers");
        registry
            .register(Box::new(reservations_active.clone()))
            .expect("register reservations_active");
        registry
            .register(Box::new(proxy_upstream_errors_total.clone()))
            .expect("register proxy_upstream_errors_total");
        registry
            .register(Box::new(probe_duration_seconds.clone()))
            .expect("register probe_duration_seconds");

        Self {
            registry,
            routes_total,
            route_duration_seconds,
            active_workers,
            reservations_active,
            proxy_upstream_errors_total,
            probe_duration_seconds,
        }
    }

    pub fn observe_route(&self, tier: &str, outcome: &str, elapsed_secs: f64) {
        self.routes_total.with_label_values(&[tier, outcome]).inc();
        self.route_duration_seconds.with_label_values(&[tier]).observe(elapsed_secs);
    }

    pub fn observe_probe(&self, worker_id: &str, kind: &str, elapsed_secs: f64) {
        self.probe_duration_seconds.with_label_values(&[worker_id, kind]).observe(elapsed_secs);
    }

    pub fn record_proxy_error(&self, worker_id: &str) {
        self.proxy_upstream_errors_total.with_label_values(&[worker_id]).inc();
    }

    pub fn set_active_workers(&self, count: usize) {
        self.active_workers.set(count as f64);
    }

    pub fn set_reservations_active(&self, count: usize) {
        self.reservations_active.set(count as f64);
    }

    /// Renders all registered metrics in the Prometheus text exposition
    /// format, for use alongside the `axum-prometheus` handle at `/metrics`.
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).expect("encode metric families");
        String::from_utf8(buf).expect("prometheus text encoding is valid utf8")
    }
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_without_panicking() {
        let _metrics = FleetMetrics::new();
    }

    #[test]
    fn render_includes_all_metric_names() {
        let metrics = FleetMetrics::new();
        metrics.observe_route("lite", "ok", 0.01);
        metrics.set_active_workers(3);
        metrics.set_reservations_active(2);
        metrics.record_proxy_error("worker-1");
        metrics.observe_probe("worker-1", "tcp", 0.002);

        let text = metrics.render();
        assert!(text.contains("fleetlb_routes_total"));
        assert!(text.contains("fleetlb_route_duration_seconds"));
        assert!(text.contains("fleetlb_active_workers"));
        assert!(text.contains("fleetlb_reservations_active"));
        assert!(text.contains("fleetlb_proxy_upstream_errors_total"));
        assert!(text.contains("fleetlb_probe_duration_seconds"));
    }

    #[test]
    fn gauges_reflect_last_set_value() {
        let metrics = FleetMetrics::new();
        metrics.set_active_workers(5);
        assert_eq!(metrics.active_workers.get(), 5.0);
        metrics.set_active_workers(2);
        assert_eq!(metrics.active_workers.get(), 2.0);
    }
}
