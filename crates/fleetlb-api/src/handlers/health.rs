//! `GET /health` (spec §6). Bypasses auth and rate limiting.

use axum::extract::State;
use axum::Json;
use fleetlb_types::model::now_ms;
use fleetlb_types::wire::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: now_ms(),
        total_workers: state.core.total_workers(),
        active_workers: state.core.active_workers(),
    })
}
