//! Shared scaffolding for the end-to-end scenario tests (spec §8). Builds a
//! real `Router` wired to an in-memory `fleetlb_core::State`, the same way
//! `main.rs` does, minus persistence (tests use `NullPersistence`) and
//! background tasks (each test drives health/sweeping explicitly).
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fleetlb_config::{AppConfig, CliArgs};
use fleetlb_monitoring::FleetMetrics;
use fleetlb_persistence::NullPersistence;
use fleetlb_types::model::{EndpointRoute, GpuReading, Worker, WorkerStats};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Starts from the documented defaults and lets the caller override fields.
pub fn config(f: impl FnOnce(&mut AppConfig)) -> Arc<AppConfig> {
    let mut cfg = AppConfig::load(None, &CliArgs::default()).expect("default config loads");
    f(&mut cfg);
    Arc::new(cfg)
}

pub struct TestApp {
    pub router: Router,
    pub core: Arc<fleetlb_core::State>,
    pub state: fleetlb_api::AppState,
}

pub fn build_app(config: Arc<AppConfig>) -> TestApp {
    let core = Arc::new(fleetlb_core::State::new(config.clone(), Arc::new(NullPersistence)));
    let metrics = Arc::new(FleetMetrics::new());
    let (prometheus_layer, transport_metrics) = axum_prometheus::PrometheusMetricLayer::pair();
    let state = fleetlb_api::AppState::new(config, core.clone(), metrics, transport_metrics);
    let router = fleetlb_api::build_router(state.clone(), prometheus_layer);
    TestApp { router, core, state }
}

pub fn worker(id: &str, endpoint: &str, total_vcpu: u32) -> Worker {
    Worker {
        worker_id: id.to_string(),
        hostname: format!("{id}.local"),
        public_ip: "203.0.113.10".to_string(),
        local_ip: "10.0.0.10".to_string(),
        latitude: None,
        longitude: None,
        country: None,
        city: None,
        total_vcpu,
        total_memory_gb: 64.0,
        total_storage_gb: 1000.0,
        total_gpus: 0,
        gpu_models: vec![],
        primary_endpoint: endpoint.to_string(),
        endpoint_routes: vec![],
    }
}

pub fn stats(per_core_cpu_pct: Vec<f64>, memory_avail_gb: f64, disk_avail_gb: f64) -> WorkerStats {
    WorkerStats {
        timestamp_ms: fleetlb_types::model::now_ms(),
        per_core_cpu_pct,
        memory_total_gb: 64.0,
        memory_used_gb: 64.0 - memory_avail_gb,
        memory_avail_gb,
        disk_total_gb: 1000.0,
        disk_used_gb: 1000.0 - disk_avail_gb,
        disk_avail_gb,
        gpus: vec![],
    }
}

pub fn gpu_stats(memory_avail_gb: f64, disk_avail_gb: f64, gpu_total_vram_gb: f64) -> WorkerStats {
    let mut s = stats(vec![5.0; 32], memory_avail_gb, disk_avail_gb);
    s.gpus = vec![GpuReading {
        device_id: 0,
        name: "H100".to_string(),
        utilization_pct: 10.0,
        memory_used_gb: 0.0,
        memory_total_gb: gpu_total_vram_gb,
        temperature_c: 40.0,
        power_draw_w: None,
    }];
    s
}

pub fn endpoint_route(url: &str, paths: &[&str]) -> EndpointRoute {
    EndpointRoute { url: url.to_string(), paths: paths.iter().map(|s| s.to_string()).collect() }
}

/// Sends a JSON `POST` and returns `(status, body_json)`.
pub async fn post_json(router: &Router, path: &str, body: Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("POST").uri(path).header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    send(router, request).await
}

pub async fn get(router: &Router, path: &str, headers: &[(&str, &str)]) -> axum::response::Response {
    let mut builder = Request::builder().method("GET").uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, json)
}

/// A tiny raw-socket backend that answers every connection with a fixed
/// `text/plain` body, closing after one response. Used to tell which
/// `EndpointRoute` a proxied request actually reached.
pub async fn spawn_http_backend(body: &'static str) -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// A raw-socket backend emitting three SSE `data:` events 50ms apart over a
/// chunked, connection-close-terminated response (spec §8 scenario 6).
pub async fn spawn_sse_backend() -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else { return };
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let header = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        let _ = socket.write_all(header.as_bytes()).await;
        let _ = socket.flush().await;
        for i in 0..3 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let data = format!("data: event-{i}\n\n");
            let chunk = format!("{:x}\r\n{}\r\n", data.len(), data);
            let _ = socket.write_all(chunk.as_bytes()).await;
            let _ = socket.flush().await;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        let _ = socket.shutdown().await;
    });
    addr
}
