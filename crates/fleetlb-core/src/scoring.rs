//! Scoring & Admission Engine (spec §4.D).

use fleetlb_types::model::{HealthStatus, TierSpec};
use fleetlb_types::model::now_ms;

use crate::ledger::PendingTotals;
use crate::registry::WorkerRecord;

const BUSY_THRESHOLD_PCT: f64 = 80.0;
const GPU_UTIL_WEIGHT: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub stale_timeout_ms: u64,
    pub health_checks_enabled: bool,
}

/// Great-circle distance in kilometers. Returns `0.0` if either endpoint
/// lacks coordinates (spec §4.D: "Distance is 0 if either endpoint lacks
/// coordinates").
pub fn haversine_km(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> f64 {
    let (Some((lat1, lon1)), Some((lat2, lon2))) = (a, b) else {
        return 0.0;
    };
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Whether `record` satisfies the admission filter for `tier`, given its
/// already-pending reservations (spec §4.D step 1).
pub fn passes_filter(
    record: &WorkerRecord,
    tier: &TierSpec,
    pending: &PendingTotals,
    policy: &AdmissionPolicy,
) -> bool {
    let now = now_ms();
    if now.saturating_sub(record.last_seen_ms) > policy.stale_timeout_ms {
        return false;
    }
    if policy.health_checks_enabled && record.health.status == HealthStatus::Unhealthy {
        return false;
    }
    let Some(stats) = &record.stats else {
        return false;
    };

    let available_cores = stats.available_core_count(BUSY_THRESHOLD_PCT) as i64;
    if available_cores - pending.vcpu as i64 < tier.vcpu as i64 {
        return false;
    }
    if stats.memory_avail_gb - pending.memory_gb < tier.memory_gb {
        return false;
    }
    if stats.disk_avail_gb - pending.storage_gb < tier.storage_gb {
        return false;
    }
    if tier.gpu > 0 {
        let available_gpus = record.worker.total_gpus as i64 - pending.gpu as i64;
        if available_gpus < tier.gpu as i64 {
            return false;
        }
    }
    // Checked independently of `tier.gpu`: a tier can request a VRAM slice of
    // a shared GPU (`gpu: 0`) without claiming a whole device.
    if tier.gpu_memory_gb > 0.0 {
        let available_vram = stats.gpu_total_vram_avail_gb() - pending.gpu_memory_gb;
        if available_vram < tier.gpu_memory_gb {
            return false;
        }
    }
    true
}

/// Lower is better (spec §4.D step 2).
pub fn score(
    record: &WorkerRecord,
    tier: &TierSpec,
    client_coords: Option<(f64, f64)>,
) -> f64 {
    let worker_coords = match (record.worker.latitude, record.worker.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };
    let distance = haversine_km(client_coords, worker_coords);
    let stats = record.stats.as_ref();
    let avg_least_loaded = stats.map(|s| s.avg_least_loaded(tier.vcpu)).unwrap_or(0.0);
    let memory_used_pct = stats.map(|s| s.memory_used_pct()).unwrap_or(0.0);
    let gpu_util_pct = stats.map(|s| s.gpu_avg_utilization_pct()).unwrap_or(0.0);

    distance + avg_least_loaded + memory_used_pct + GPU_UTIL_WEIGHT * gpu_util_pct
        + record.health.ewma_latency_ms
}

/// Filters `candidates` by the admission filter, scores the survivors, and
/// returns the minimum-score eligible record (spec §4.D step 3). Ties are
/// broken by iteration order, matching the spec's "undefined but stable"
/// wording.
pub fn select_best<'a>(
    candidates: &'a [WorkerRecord],
    tier: &TierSpec,
    client_coords: Option<(f64, f64)>,
    pending_of: impl Fn(&str) -> PendingTotals,
    policy: &AdmissionPolicy,
) -> Option<&'a WorkerRecord> {
    candidates
        .iter()
        .filter(|r| passes_filter(r, tier, &pending_of(&r.worker.worker_id), policy))
        .min_by(|a, b| {
            score(a, tier, client_coords)
                .partial_cmp(&score(b, tier, client_coords))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlb_types::model::{EndpointRoute, HealthSnapshot, WorkerStats};

    fn tier(vcpu: u32, memory_gb: f64, storage_gb: f64) -> TierSpec {
        TierSpec { name: "lite".into(), vcpu, memory_gb, storage_gb, gpu: 0, gpu_memory_gb: 0.0 }
    }

    fn sample_worker(id: &str) -> fleetlb_types::model::Worker {
        fleetlb_types::model::Worker {
            worker_id: id.to_string(),
            hostname: format!("{id}.local"),
            public_ip: "203.0.113.1".into(),
            local_ip: "10.0.0.1".into(),
            latitude: None,
            longitude: None,
            country: None,
            city: None,
            total_vcpu: 8,
            total_memory_gb: 32.0,
            total_storage_gb: 500.0,
            total_gpus: 0,
            gpu_models: vec![],
            primary_endpoint: format!("http://{id}:11000"),
            endpoint_routes: vec![EndpointRoute { url: format!("http://{id}:11000"), paths: vec!["/*".into()] }],
        }
    }

    fn record(id: &str, cpu: Vec<f64>, mem_avail: f64, disk_avail: f64) -> WorkerRecord {
        WorkerRecord {
            worker: sample_worker(id),
            stats: Some(WorkerStats {
                timestamp_ms: now_ms(),
                per_core_cpu_pct: cpu,
                memory_total_gb: 32.0,
                memory_used_gb: 32.0 - mem_avail,
                memory_avail_gb: mem_avail,
                disk_total_gb: 500.0,
                disk_used_gb: 500.0 - disk_avail,
                disk_avail_gb: disk_avail,
                gpus: vec![],
            }),
            health: HealthSnapshot { status: HealthStatus::Healthy, ..Default::default() },
            last_seen_ms: now_ms(),
        }
    }

    #[test]
    fn haversine_zero_without_coordinates() {
        assert_eq!(haversine_km(None, Some((1.0, 1.0))), 0.0);
        assert_eq!(haversine_km(Some((1.0, 1.0)), None), 0.0);
    }

    #[test]
    fn haversine_known_distance_sf_to_nyc() {
        let sf = (37.7749, -122.4194);
        let nyc = (40.7128, -74.0060);
        let km = haversine_km(Some(sf), Some(nyc));
        assert!((km - 4130.0).abs() < 100.0, "got {km}");
    }

    #[test]
    fn filter_rejects_insufficient_cores() {
        let rec = record("w1", vec![90.0, 90.0], 16.0, 100.0);
        let t = tier(2, 1.0, 1.0);
        let policy = AdmissionPolicy { stale_timeout_ms: 60_000, health_checks_enabled: true };
        assert!(!passes_filter(&rec, &t, &PendingTotals::default(), &policy));
    }

    #[test]
    fn filter_accounts_for_pending_reservations() {
        let rec = record("w1", vec![10.0, 10.0], 16.0, 100.0);
        let t = tier(2, 1.0, 1.0);
        let policy = AdmissionPolicy { stale_timeout_ms: 60_000, health_checks_enabled: true };
        let pending = PendingTotals { vcpu: 1, ..Default::default() };
        assert!(!passes_filter(&rec, &t, &pending, &policy));
    }

    #[test]
    fn filter_rejects_unhealthy_when_checks_enabled() {
        let mut rec = record("w1", vec![10.0, 10.0], 16.0, 100.0);
        rec.health.status = HealthStatus::Unhealthy;
        let t = tier(1, 1.0, 1.0);
        let policy = AdmissionPolicy { stale_timeout_ms: 60_000, health_checks_enabled: true };
        assert!(!passes_filter(&rec, &t, &PendingTotals::default(), &policy));
    }

    #[test]
    fn select_best_prefers_lower_score() {
        let busy = record("busy", vec![70.0, 70.0], 16.0, 100.0);
        let idle = record("idle", vec![5.0, 5.0], 16.0, 100.0);
        let candidates = vec![busy, idle];
        let t = tier(1, 1.0, 1.0);
        let policy = AdmissionPolicy { stale_timeout_ms: 60_000, health_checks_enabled: true };
        let best = select_best(&candidates, &t, None, |_| PendingTotals::default(), &policy).unwrap();
        assert_eq!(best.worker.worker_id, "idle");
    }

    #[test]
    fn select_best_returns_none_when_nothing_eligible() {
        let rec = record("w1", vec![95.0], 0.0, 0.0);
        let t = tier(4, 10.0, 10.0);
        let policy = AdmissionPolicy { stale_timeout_ms: 60_000, health_checks_enabled: true };
        assert!(select_best(&[rec], &t, None, |_| PendingTotals::default(), &policy).is_none());
    }
}
