//! Core data model (spec §3).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-ish wall clock timestamp, milliseconds since the Unix epoch.
///
/// The core never calls `SystemTime::now()` directly outside this helper so that
/// tests can substitute a fixed clock by constructing state with an explicit value.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A path-based endpoint route for multi-endpoint workers (spec §3, §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRoute {
    pub url: String,
    pub paths: Vec<String>,
}

/// One GPU device reading, reported in `WorkerStats` (spec §6 `WorkerStats`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuReading {
    pub device_id: u32,
    pub name: String,
    pub utilization_pct: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub temperature_c: f64,
    pub power_draw_w: Option<f64>,
}

/// Static worker registration data (spec §3 Worker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    pub hostname: String,
    pub public_ip: String,
    pub local_ip: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub total_vcpu: u32,
    pub total_memory_gb: f64,
    pub total_storage_gb: f64,
    pub total_gpus: u32,
    pub gpu_models: Vec<String>,
    pub primary_endpoint: String,
    pub endpoint_routes: Vec<EndpointRoute>,
}

/// Latest telemetry reading for a worker (spec §3 WorkerStats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStats {
    pub timestamp_ms: u64,
    pub per_core_cpu_pct: Vec<f64>,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_avail_gb: f64,
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_avail_gb: f64,
    pub gpus: Vec<GpuReading>,
}

impl WorkerStats {
    /// Cores with usage below the busy threshold (spec §4.D filter step 1).
    pub fn available_core_count(&self, busy_threshold_pct: f64) -> usize {
        self.per_core_cpu_pct
            .iter()
            .filter(|&&u| u < busy_threshold_pct)
            .count()
    }

    /// Mean of the `n` smallest CPU usage readings, or the mean of all of them if
    /// `n >= len` (spec §4.D `avgLeastLoaded`).
    pub fn avg_least_loaded(&self, n: u32) -> f64 {
        if self.per_core_cpu_pct.is_empty() {
            return 0.0;
        }
        let mut sorted = self.per_core_cpu_pct.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let take = (n as usize).min(sorted.len()).max(1);
        let slice = &sorted[..take];
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    pub fn memory_used_pct(&self) -> f64 {
        if self.memory_total_gb <= 0.0 {
            0.0
        } else {
            (self.memory_used_gb / self.memory_total_gb) * 100.0
        }
    }

    pub fn gpu_avg_utilization_pct(&self) -> f64 {
        if self.gpus.is_empty() {
            return 0.0;
        }
        self.gpus.iter().map(|g| g.utilization_pct).sum::<f64>() / self.gpus.len() as f64
    }

    pub fn gpu_total_vram_avail_gb(&self) -> f64 {
        self.gpus
            .iter()
            .map(|g| (g.memory_total_gb - g.memory_used_gb).max(0.0))
            .sum()
    }
}

/// Health status, one of the three states from spec §3 HealthState.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Snapshot of a worker's health, as read by callers outside the prober itself.
///
/// The live, mutation-friendly version of this (atomics + EWMA) lives in
/// `fleetlb-core::health::HealthCell`; this is the plain-data form used for
/// serialization (e.g. `/clients`) and for persistence mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub ewma_latency_ms: f64,
    pub consecutive_success: u32,
    pub consecutive_failure: u32,
    pub last_probe_ms: u64,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            ewma_latency_ms: 0.0,
            consecutive_success: 0,
            consecutive_failure: 0,
            last_probe_ms: 0,
        }
    }
}

/// A named resource profile (spec §3 Tier). Immutable once loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub gpu: u32,
    pub gpu_memory_gb: f64,
}

/// A pending resource hold on one worker (spec §3 PendingAllocation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAllocation {
    pub session_id: String,
    pub tier_name: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub gpu: u32,
    pub gpu_memory_gb: f64,
    pub created_at_ms: u64,
    pub request_id: String,
}

/// A `(session_id, tier)` sticky binding (spec §3 StickyAssignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyAssignment {
    pub worker_id: String,
    pub created_at_ms: u64,
    pub last_used_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_least_loaded_uses_n_smallest() {
        let stats = sample_stats(vec![10.0, 10.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0]);
        // two free cores, tier needs 1 vcpu -> mean of the single smallest = 10.0
        assert_eq!(stats.avg_least_loaded(1), 10.0);
        assert_eq!(stats.avg_least_loaded(2), 10.0);
    }

    #[test]
    fn avg_least_loaded_saturates_to_full_mean() {
        let stats = sample_stats(vec![10.0, 20.0, 30.0]);
        let full_mean = (10.0 + 20.0 + 30.0) / 3.0;
        assert_eq!(stats.avg_least_loaded(10), full_mean);
    }

    #[test]
    fn available_core_count_respects_threshold() {
        let stats = sample_stats(vec![10.0, 10.0, 90.0, 90.0]);
        assert_eq!(stats.available_core_count(80.0), 2);
    }

    #[test]
    fn gpu_vram_avail_sums_free_memory() {
        let mut stats = sample_stats(vec![0.0]);
        stats.gpus.push(GpuReading {
            device_id: 0,
            name: "A100".into(),
            utilization_pct: 10.0,
            memory_used_gb: 10.0,
            memory_total_gb: 80.0,
            temperature_c: 40.0,
            power_draw_w: None,
        });
        assert_eq!(stats.gpu_total_vram_avail_gb(), 70.0);
    }

    fn sample_stats(cpu: Vec<f64>) -> WorkerStats {
        WorkerStats {
            timestamp_ms: now_ms(),
            per_core_cpu_pct: cpu,
            memory_total_gb: 32.0,
            memory_used_gb: 8.0,
            memory_avail_gb: 24.0,
            disk_total_gb: 500.0,
            disk_used_gb: 100.0,
            disk_avail_gb: 400.0,
            gpus: vec![],
        }
    }
}
