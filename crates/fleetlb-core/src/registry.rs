//! Fleet Registry (spec §4.A): registered workers, last stats, health, endpoints.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use fleetlb_types::model::{now_ms, HealthSnapshot, Worker, WorkerStats};
use fleetlb_types::{FleetError, FleetResult};

/// One registered worker plus everything the registry tracks about it.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub worker: Worker,
    pub stats: Option<WorkerStats>,
    pub health: HealthSnapshot,
    pub last_seen_ms: u64,
}

impl WorkerRecord {
    fn new(worker: Worker) -> Self {
        Self {
            worker,
            stats: None,
            health: HealthSnapshot::default(),
            last_seen_ms: now_ms(),
        }
    }

    pub fn is_stale(&self, stale_timeout: Duration, now: u64) -> bool {
        now.saturating_sub(self.last_seen_ms) > stale_timeout.as_millis() as u64
    }
}

/// Concurrent map of `worker_id -> WorkerRecord`.
///
/// Sharded via `DashMap` so plain reads (listing, `/clients`) don't contend
/// with the outer `State` lock; mutations that must be atomic with the ledger
/// or sticky map still happen under that lock (see `fleetlb_core::state`).
#[derive(Debug, Default)]
pub struct FleetRegistry {
    workers: DashMap<String, WorkerRecord>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self { workers: DashMap::new() }
    }

    /// Registers or re-registers a worker. Any other worker sharing the same
    /// `primary_endpoint` is evicted first (spec §3: "at most one worker per
    /// primary_endpoint URL; the most recent registration evicts older
    /// duplicates").
    pub fn register(&self, worker: Worker) {
        let endpoint = worker.primary_endpoint.clone();
        let incoming_id = worker.worker_id.clone();
        let duplicate_ids: Vec<String> = self
            .workers
            .iter()
            .filter(|e| e.value().worker.primary_endpoint == endpoint && e.key() != &incoming_id)
            .map(|e| e.key().clone())
            .collect();
        for id in duplicate_ids {
            self.workers.remove(&id);
        }
        match self.workers.get_mut(&incoming_id) {
            Some(mut existing) => {
                existing.worker = worker;
                existing.last_seen_ms = now_ms();
            }
            None => {
                self.workers.insert(incoming_id, WorkerRecord::new(worker));
            }
        }
    }

    pub fn update_stats(&self, worker_id: &str, stats: WorkerStats) -> FleetResult<()> {
        let mut entry = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| FleetError::unknown_worker(worker_id))?;
        entry.stats = Some(stats);
        entry.last_seen_ms = now_ms();
        Ok(())
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerRecord> {
        self.workers.get(worker_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, worker_id: &str) -> bool {
        self.workers.contains_key(worker_id)
    }

    pub fn set_health(&self, worker_id: &str, health: HealthSnapshot) {
        if let Some(mut e) = self.workers.get_mut(worker_id) {
            e.health = health;
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// All workers with `last_seen` fresher than `stale_timeout`.
    pub fn list_active(&self, stale_timeout: Duration) -> Vec<WorkerRecord> {
        let now = now_ms();
        self.workers
            .iter()
            .filter(|e| !e.value().is_stale(stale_timeout, now))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn list_all(&self) -> Vec<WorkerRecord> {
        self.workers.iter().map(|e| e.value().clone()).collect()
    }

    /// Removes workers whose `last_seen` predates `threshold` (an absolute
    /// duration, typically `3 * stale_timeout` per the sweeper, spec §4.J).
    /// Returns the ids removed so the caller can also prune sticky/ledger state.
    pub fn purge_stale(&self, threshold: Duration) -> Vec<String> {
        let now = now_ms();
        let stale_ids: Vec<String> = self
            .workers
            .iter()
            .filter(|e| e.value().is_stale(threshold, now))
            .map(|e| e.key().clone())
            .collect();
        for id in &stale_ids {
            self.workers.remove(id);
        }
        stale_ids
    }

    pub fn remove(&self, worker_id: &str) -> bool {
        self.workers.remove(worker_id).is_some()
    }

    /// Snapshot of `worker_id -> WorkerStats` for persistence mirroring.
    pub fn snapshot_stats(&self) -> HashMap<String, WorkerStats> {
        self.workers
            .iter()
            .filter_map(|e| e.value().stats.clone().map(|s| (e.key().clone(), s)))
            .collect()
    }
}
