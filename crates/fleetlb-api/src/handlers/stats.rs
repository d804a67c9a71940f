//! `POST /stats` (spec §6, §4.A). Stats for an unregistered `worker_id` are a
//! 400 (spec §7 `UnknownWorker`).

use axum::extract::State;
use axum::Json;
use fleetlb_types::wire::{StatsResponse, WorkerStatsPayload};

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn stats(
    State(state): State<AppState>,
    Json(body): Json<WorkerStatsPayload>,
) -> Result<Json<StatsResponse>, ApiError> {
    let worker_id = body.worker_id.clone();
    state.core.update_stats(&worker_id, body.into())?;
    Ok(Json(StatsResponse::default()))
}
