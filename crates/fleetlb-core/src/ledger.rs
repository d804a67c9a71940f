//! Reservation Ledger (spec §4.B): per-worker pending resource holds with TTL.

use std::collections::HashMap;
use std::time::Duration;

use fleetlb_types::model::{now_ms, PendingAllocation};

#[derive(Debug, Clone, Copy, Default)]
pub struct PendingTotals {
    pub vcpu: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub gpu: u32,
    pub gpu_memory_gb: f64,
}

/// `worker_id -> ordered list of PendingAllocation`.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    entries: HashMap<String, Vec<PendingAllocation>>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Reserves resources on `worker_id`. If `session_id` is non-empty, any
    /// existing entry for the same `(session_id, tier_name)` on this worker is
    /// replaced first (spec §4.B).
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        &mut self,
        worker_id: &str,
        session_id: &str,
        tier_name: &str,
        vcpu: u32,
        memory_gb: f64,
        storage_gb: f64,
        gpu: u32,
        gpu_memory_gb: f64,
        request_id: &str,
    ) {
        let list = self.entries.entry(worker_id.to_string()).or_default();
        if !session_id.is_empty() {
            list.retain(|e| !(e.session_id == session_id && e.tier_name == tier_name));
        }
        list.push(PendingAllocation {
            session_id: session_id.to_string(),
            tier_name: tier_name.to_string(),
            vcpu,
            memory_gb,
            storage_gb,
            gpu,
            gpu_memory_gb,
            created_at_ms: now_ms(),
            request_id: request_id.to_string(),
        });
    }

    /// Idempotent release of a specific `(session_id, tier_name)` hold.
    pub fn release(&mut self, worker_id: &str, session_id: &str, tier_name: &str) {
        if let Some(list) = self.entries.get_mut(worker_id) {
            list.retain(|e| !(e.session_id == session_id && e.tier_name == tier_name));
        }
    }

    pub fn sum_pending(&self, worker_id: &str) -> PendingTotals {
        let Some(list) = self.entries.get(worker_id) else {
            return PendingTotals::default();
        };
        list.iter().fold(PendingTotals::default(), |mut acc, e| {
            acc.vcpu += e.vcpu;
            acc.memory_gb += e.memory_gb;
            acc.storage_gb += e.storage_gb;
            acc.gpu += e.gpu;
            acc.gpu_memory_gb += e.gpu_memory_gb;
            acc
        })
    }

    /// Removes entries older than `ttl`. Returns the number removed.
    pub fn sweep(&mut self, ttl: Duration) -> usize {
        let now = now_ms();
        let ttl_ms = ttl.as_millis() as u64;
        let mut removed = 0;
        self.entries.retain(|_, list| {
            let before = list.len();
            list.retain(|e| now.saturating_sub(e.created_at_ms) <= ttl_ms);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Drops every entry for a worker, used when a worker is purged entirely.
    pub fn remove_worker(&mut self, worker_id: &str) {
        self.entries.remove(worker_id);
    }

    pub fn entries_for(&self, worker_id: &str) -> Vec<PendingAllocation> {
        self.entries.get(worker_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_sum() {
        let mut ledger = ReservationLedger::new();
        ledger.reserve("w1", "s1", "lite", 2, 4.0, 10.0, 0, 0.0, "r1");
        let totals = ledger.sum_pending("w1");
        assert_eq!(totals.vcpu, 2);
        assert_eq!(totals.memory_gb, 4.0);
    }

    #[test]
    fn reserve_replaces_same_session_tier_on_same_worker() {
        let mut ledger = ReservationLedger::new();
        ledger.reserve("w1", "s1", "lite", 2, 4.0, 10.0, 0, 0.0, "r1");
        ledger.reserve("w1", "s1", "lite", 4, 8.0, 20.0, 0, 0.0, "r2");
        let totals = ledger.sum_pending("w1");
        assert_eq!(totals.vcpu, 4);
        assert_eq!(ledger.entries_for("w1").len(), 1);
    }

    #[test]
    fn anonymous_reservations_stack_independently() {
        let mut ledger = ReservationLedger::new();
        ledger.reserve("w1", "", "lite", 1, 1.0, 1.0, 0, 0.0, "r1");
        ledger.reserve("w1", "", "lite", 1, 1.0, 1.0, 0, 0.0, "r2");
        assert_eq!(ledger.entries_for("w1").len(), 2);
        assert_eq!(ledger.sum_pending("w1").vcpu, 2);
    }

    #[test]
    fn release_is_idempotent() {
        let mut ledger = ReservationLedger::new();
        ledger.reserve("w1", "s1", "lite", 2, 4.0, 10.0, 0, 0.0, "r1");
        ledger.release("w1", "s1", "lite");
        ledger.release("w1", "s1", "lite");
        assert_eq!(ledger.sum_pending("w1").vcpu, 0);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let mut ledger = ReservationLedger::new();
        ledger.reserve("w1", "s1", "lite", 2, 4.0, 10.0, 0, 0.0, "r1");
        if let Some(list) = ledger.entries.get_mut("w1") {
            list[0].created_at_ms = 0;
        }
        let removed = ledger.sweep(Duration::from_millis(1));
        assert_eq!(removed, 1);
        assert_eq!(ledger.sum_pending("w1").vcpu, 0);
    }
}
