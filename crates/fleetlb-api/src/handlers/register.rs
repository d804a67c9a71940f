//! `POST /register` (spec §6, §4.A).

use axum::extract::State;
use axum::Json;
use fleetlb_types::wire::{Registration, RegistrationResponse};

use crate::state::AppState;

pub async fn register(State(state): State<AppState>, Json(body): Json<Registration>) -> Json<RegistrationResponse> {
    let worker_id = body.worker_id.clone();
    state.core.register(body.into_worker());
    tracing::info!(worker_id, "worker registered");
    Json(RegistrationResponse::default())
}
