//! Port traits. Small seams so `fleetlb-core` depends on interfaces rather
//! than concrete Redis/reqwest types, mirroring `riptide_types::ports::*`.

use async_trait::async_trait;

use crate::error::FleetResult;
use crate::model::{PendingAllocation, StickyAssignment, Worker, WorkerStats};

/// Warm-start snapshot persisted across restarts (spec §3, persistence adapter).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FleetSnapshot {
    pub workers: Vec<Worker>,
    pub latest_stats: Vec<(String, WorkerStats)>,
    /// `((session_id, tier), assignment)` pairs.
    pub sticky: Vec<((String, String), StickyAssignment)>,
    /// `(worker_id, allocation)` pairs, since `PendingAllocation` itself does
    /// not carry the worker id — it is the value type of a map keyed by it.
    pub pending: Vec<(String, PendingAllocation)>,
}

/// Best-effort, non-blocking persistence of fleet state.
///
/// Implementations must never let a slow or unreachable backing store stall
/// the request path: callers treat every method as advisory and log failures
/// rather than propagating them into admission decisions.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Load the last snapshot at startup, if any exists.
    async fn load_snapshot(&self) -> FleetResult<Option<FleetSnapshot>>;

    /// Mirror the current in-memory state. Called periodically by the sweeper,
    /// not on every mutation.
    async fn save_snapshot(&self, snapshot: &FleetSnapshot) -> FleetResult<()>;

    /// Cheap liveness check for the adapter's backing store, surfaced on `/health`.
    async fn ping(&self) -> FleetResult<()>;
}

/// Outcome of a single health probe (spec §3 Health Prober).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Active health checking of one worker endpoint.
///
/// Kept as a trait so the core's probe scheduler can be unit-tested against a
/// fake prober instead of making real TCP/HTTP calls.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, worker: &Worker) -> (ProbeOutcome, std::time::Duration);
}
