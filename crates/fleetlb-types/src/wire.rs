//! HTTP wire DTOs (spec §6). Kept separate from `model` so the JSON shape can
//! evolve independently of the in-memory representation.

use serde::{Deserialize, Serialize};

use crate::model::{EndpointRoute, GpuReading, Worker, WorkerStats};

fn default_tier_field() -> String {
    "tier".to_string()
}

/// `POST /register` body.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub worker_id: String,
    pub hostname: String,
    pub public_ip: String,
    pub local_ip: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub total_cpu: u32,
    pub total_memory_gb: f64,
    pub total_storage_gb: f64,
    #[serde(default)]
    pub total_gpus: u32,
    #[serde(default)]
    pub gpu_models: Vec<String>,
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointRoute>,
}

impl Registration {
    /// Builds the canonical primary endpoint: `endpoint_url` if given, else
    /// `http://{local_ip}:11000`, else `http://{public_ip}:11000`.
    pub fn into_worker(self) -> Worker {
        let primary_endpoint = self.endpoint_url.clone().unwrap_or_else(|| {
            if !self.local_ip.is_empty() {
                format!("http://{}:11000", self.local_ip)
            } else {
                format!("http://{}:11000", self.public_ip)
            }
        });

        Worker {
            worker_id: self.worker_id,
            hostname: self.hostname,
            public_ip: self.public_ip,
            local_ip: self.local_ip,
            latitude: self.latitude,
            longitude: self.longitude,
            country: self.country,
            city: self.city,
            total_vcpu: self.total_cpu,
            total_memory_gb: self.total_memory_gb,
            total_storage_gb: self.total_storage_gb,
            total_gpus: self.total_gpus,
            gpu_models: self.gpu_models,
            primary_endpoint,
            endpoint_routes: self.endpoints,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResponse {
    pub status: &'static str,
}

impl Default for RegistrationResponse {
    fn default() -> Self {
        Self { status: "registered" }
    }
}

/// `POST /stats` body.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerStatsPayload {
    pub worker_id: String,
    #[serde(default)]
    pub hostname: String,
    pub timestamp: u64,
    pub cpu_cores: u32,
    pub cpu_usage_avg: Vec<f64>,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_avail_gb: f64,
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_avail_gb: f64,
    #[serde(default)]
    pub gpus: Vec<GpuReading>,
}

impl From<WorkerStatsPayload> for WorkerStats {
    fn from(p: WorkerStatsPayload) -> Self {
        WorkerStats {
            timestamp_ms: p.timestamp,
            per_core_cpu_pct: p.cpu_usage_avg,
            memory_total_gb: p.memory_total_gb,
            memory_used_gb: p.memory_used_gb,
            memory_avail_gb: p.memory_avail_gb,
            disk_total_gb: p.disk_total_gb,
            disk_used_gb: p.disk_used_gb,
            disk_avail_gb: p.disk_avail_gb,
            gpus: p.gpus,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub status: &'static str,
}

impl Default for StatsResponse {
    fn default() -> Self {
        Self { status: "received" }
    }
}

/// `POST /route` body.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingRequest {
    #[serde(default = "default_tier_field")]
    pub tier: String,
    #[serde(default)]
    pub client_ip: String,
    pub client_lat: Option<f64>,
    pub client_lon: Option<f64>,
}

/// `POST /route` success response.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingResponse {
    pub worker_id: String,
    pub endpoint: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: u64,
    pub total_workers: usize,
    pub active_workers: usize,
}

/// Per-core CPU rendered as printable strings, e.g. `"12.3%"` (spec §6 `/clients`).
#[derive(Debug, Clone, Serialize)]
pub struct ClientGpuSummary {
    pub device_id: u32,
    pub name: String,
    pub utilization: String,
    pub memory: String,
    pub temperature: String,
}

/// One row of the `GET /clients` array.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub worker_id: String,
    pub hostname: String,
    pub public_ip: String,
    pub health_status: String,
    pub per_core_cpu: Vec<String>,
    pub memory: String,
    pub disk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<Vec<ClientGpuSummary>>,
    pub last_stats_ms: Option<u64>,
}

/// `POST /clients/purge` response.
#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    pub purged: usize,
    pub cache_purged: usize,
    pub db_purged: usize,
    pub timestamp: u64,
}

/// `POST /clients/purge-pending` response.
#[derive(Debug, Clone, Serialize)]
pub struct PurgePendingResponse {
    pub purged: usize,
    pub timestamp: u64,
}

/// Generic `{"type": ..., "message": ...}` error body, shared by every failure
/// response regardless of status code.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
