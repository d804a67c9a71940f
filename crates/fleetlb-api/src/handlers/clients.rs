//! `GET /clients`, `POST /clients/purge`, `POST /clients/purge-pending`
//! (spec §6). Formats per-core CPU, memory, disk, and GPU stats for display.

use axum::extract::{Query, State};
use axum::Json;
use fleetlb_core::WorkerRecord;
use fleetlb_types::model::now_ms;
use fleetlb_types::wire::{ClientGpuSummary, ClientSummary, PurgePendingResponse, PurgeResponse};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClientsQuery {
    #[serde(default)]
    active_only: bool,
}

pub async fn list_clients(State(state): State<AppState>, Query(q): Query<ClientsQuery>) -> Json<Vec<ClientSummary>> {
    let records = if q.active_only {
        state.core.list_active()
    } else {
        state.core.list_all()
    };

    let summaries = records
        .into_iter()
        .map(|record| summarize(&state, record))
        .collect();
    Json(summaries)
}

fn summarize(state: &AppState, record: WorkerRecord) -> ClientSummary {
    let health = state.core.health_snapshot(&record.worker.worker_id);
    let stats = record.stats;

    let (per_core_cpu, memory, disk, gpus, last_stats_ms) = match stats {
        Some(stats) => {
            let per_core = stats.per_core_cpu_pct.iter().map(|v| format!("{v:.1}%")).collect();
            let memory = format!(
                "{:.1}/{:.1} GB ({:.0}%)",
                stats.memory_used_gb,
                stats.memory_total_gb,
                stats.memory_used_pct()
            );
            let disk = format!(
                "{:.1}/{:.1} GB",
                stats.disk_used_gb, stats.disk_total_gb
            );
            let gpus = if stats.gpus.is_empty() {
                None
            } else {
                Some(
                    stats
                        .gpus
                        .iter()
                        .map(|g| ClientGpuSummary {
                            device_id: g.device_id,
                            name: g.name.clone(),
                            utilization: format!("{:.1}%", g.utilization_pct),
                            memory: format!("{:.1}/{:.1} GB", g.memory_used_gb, g.memory_total_gb),
                            temperature: format!("{:.0}C", g.temperature_c),
                        })
                        .collect(),
                )
            };
            (per_core, memory, disk, gpus, Some(stats.timestamp_ms))
        }
        None => (Vec::new(), "no stats reported".to_string(), "no stats reported".to_string(), None, None),
    };

    ClientSummary {
        worker_id: record.worker.worker_id,
        hostname: record.worker.hostname,
        public_ip: record.worker.public_ip,
        health_status: health.status.to_string(),
        per_core_cpu,
        memory,
        disk,
        gpus,
        last_stats_ms,
    }
}

pub async fn purge_all(State(state): State<AppState>) -> Json<PurgeResponse> {
    let purged = state.core.purge_all().await;
    Json(PurgeResponse { purged, cache_purged: purged, db_purged: purged, timestamp: now_ms() })
}

pub async fn purge_pending(State(state): State<AppState>) -> Json<PurgePendingResponse> {
    let purged = state.core.purge_pending().await;
    Json(PurgePendingResponse { purged, timestamp: now_ms() })
}
