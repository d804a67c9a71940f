//! Ambient observability stack: structured logging/tracing setup and
//! Prometheus metrics, grounded in the teacher's `main.rs` tracing
//! initialization and its hand-registered `prometheus::Registry` approach.

pub mod metrics;
pub mod telemetry;

pub use metrics::FleetMetrics;
pub use telemetry::init_tracing;
