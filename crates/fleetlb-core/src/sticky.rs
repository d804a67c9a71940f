//! Sticky Assignment Map (spec §4.C): `(session_id, tier) -> worker_id`.

use std::collections::HashMap;

use fleetlb_types::model::{now_ms, StickyAssignment};

#[derive(Debug, Default)]
pub struct StickyMap {
    assignments: HashMap<(String, String), StickyAssignment>,
}

impl StickyMap {
    pub fn new() -> Self {
        Self { assignments: HashMap::new() }
    }

    pub fn get(&self, session_id: &str, tier: &str) -> Option<StickyAssignment> {
        self.assignments.get(&(session_id.to_string(), tier.to_string())).cloned()
    }

    pub fn touch(&mut self, session_id: &str, tier: &str) {
        if let Some(a) = self.assignments.get_mut(&(session_id.to_string(), tier.to_string())) {
            a.last_used_ms = now_ms();
        }
    }

    /// Last-writer-wins but race-aware: if an entry already exists for this
    /// key, the pre-existing `worker_id` is returned instead of overwriting it
    /// (spec §4.C: "racing goroutines converge to the same decision").
    pub fn put(&mut self, session_id: &str, tier: &str, worker_id: &str) -> String {
        let key = (session_id.to_string(), tier.to_string());
        if let Some(existing) = self.assignments.get(&key) {
            return existing.worker_id.clone();
        }
        let now = now_ms();
        self.assignments.insert(
            key,
            StickyAssignment {
                worker_id: worker_id.to_string(),
                created_at_ms: now,
                last_used_ms: now,
            },
        );
        worker_id.to_string()
    }

    pub fn remove(&mut self, session_id: &str, tier: &str) {
        self.assignments.remove(&(session_id.to_string(), tier.to_string()));
    }

    /// Removes every assignment pointing at `worker_id` (spec §4.E, called
    /// atomically with a health -> unhealthy transition).
    pub fn remove_all_of_worker(&mut self, worker_id: &str) -> usize {
        let before = self.assignments.len();
        self.assignments.retain(|_, a| a.worker_id != worker_id);
        before - self.assignments.len()
    }

    /// `(tier, worker_id)` pairs sharing `session_id`, for cross-tier affinity.
    pub fn session_bag(&self, session_id: &str) -> Vec<(String, String)> {
        self.assignments
            .iter()
            .filter(|((sid, _), _)| sid == session_id)
            .map(|((_, tier), a)| (tier.clone(), a.worker_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn all(&self) -> Vec<((String, String), StickyAssignment)> {
        self.assignments.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let mut map = StickyMap::new();
        map.put("s1", "lite", "w1");
        assert_eq!(map.get("s1", "lite").unwrap().worker_id, "w1");
    }

    #[test]
    fn put_is_race_aware_first_writer_wins() {
        let mut map = StickyMap::new();
        let winner = map.put("s1", "lite", "w1");
        let loser = map.put("s1", "lite", "w2");
        assert_eq!(winner, "w1");
        assert_eq!(loser, "w1");
        assert_eq!(map.get("s1", "lite").unwrap().worker_id, "w1");
    }

    #[test]
    fn remove_is_idempotent() {
        let mut map = StickyMap::new();
        map.put("s1", "lite", "w1");
        map.remove("s1", "lite");
        map.remove("s1", "lite");
        assert!(map.get("s1", "lite").is_none());
    }

    #[test]
    fn remove_all_of_worker_clears_every_tier() {
        let mut map = StickyMap::new();
        map.put("s1", "lite", "w1");
        map.put("s1", "heavy", "w1");
        map.put("s2", "lite", "w2");
        let removed = map.remove_all_of_worker("w1");
        assert_eq!(removed, 2);
        assert!(map.get("s1", "lite").is_none());
        assert!(map.get("s1", "heavy").is_none());
        assert!(map.get("s2", "lite").is_some());
    }

    #[test]
    fn session_bag_collects_cross_tier_pairs() {
        let mut map = StickyMap::new();
        map.put("s1", "lite", "w1");
        map.put("s1", "heavy", "w2");
        let mut bag = map.session_bag("s1");
        bag.sort();
        assert_eq!(
            bag,
            vec![("heavy".to_string(), "w2".to_string()), ("lite".to_string(), "w1".to_string())]
        );
    }
}
