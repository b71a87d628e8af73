//! Abuse-signal aggregation (spec §4.5): anonymised node ids reporting
//! the same (requester, signal_type) key accumulate toward a threshold
//! that penalises the requester's reputation exactly once.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub const UNIQUE_NODE_THRESHOLD: usize = 5;

/// Hash an ephemeral node id so the aggregate never retains it in the
/// clear (spec §4.5 "anonymise each node's ephemeral id by hashing it").
pub fn anonymise_node_id(node_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_bytes());
    hex::encode(hasher.finalize())
}

struct AbuseAggregate {
    unique_nodes: HashSet<String>,
    penalised: bool,
    last_activity: chrono::DateTime<chrono::Utc>,
}

pub struct AbuseSignalStore {
    aggregates: Mutex<HashMap<(String, String), AbuseAggregate>>,
}

impl AbuseSignalStore {
    pub fn new() -> Self {
        Self {
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    /// Record one node's report of `signal_type` against `requester_id`.
    /// Returns `true` exactly once, the first time the unique-node count
    /// for this key crosses `UNIQUE_NODE_THRESHOLD` — the caller applies
    /// the reputation penalty only on that transition.
    pub fn record(&self, requester_id: &str, signal_type: &str, node_id: &str) -> bool {
        let anonymised = anonymise_node_id(node_id);
        let key = (requester_id.to_string(), signal_type.to_string());

        let mut aggregates = self.aggregates.lock();
        let aggregate = aggregates.entry(key).or_insert_with(|| AbuseAggregate {
            unique_nodes: HashSet::new(),
            penalised: false,
            last_activity: chrono::Utc::now(),
        });
        aggregate.unique_nodes.insert(anonymised);
        aggregate.last_activity = chrono::Utc::now();

        if !aggregate.penalised && aggregate.unique_nodes.len() >= UNIQUE_NODE_THRESHOLD {
            aggregate.penalised = true;
            return true;
        }
        false
    }

    pub fn gc(&self, idle_threshold: chrono::Duration) {
        let now = chrono::Utc::now();
        let mut aggregates = self.aggregates.lock();
        aggregates.retain(|_, agg| now - agg.last_activity < idle_threshold);
    }
}

impl Default for AbuseSignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalises_exactly_once_at_threshold() {
        let store = AbuseSignalStore::new();
        let mut penalised_count = 0;
        for i in 0..10 {
            if store.record("req-1", "SLOW_DELIVERY", &format!("node-{i}")) {
                penalised_count += 1;
            }
        }
        assert_eq!(penalised_count, 1);
    }

    #[test]
    fn same_node_reporting_twice_does_not_double_count() {
        let store = AbuseSignalStore::new();
        for _ in 0..10 {
            store.record("req-1", "SLOW_DELIVERY", "node-a");
        }
        assert!(!store.record("req-1", "SLOW_DELIVERY", "node-b"));
        assert!(!store.record("req-1", "SLOW_DELIVERY", "node-c"));
        assert!(!store.record("req-1", "SLOW_DELIVERY", "node-d"));
        assert!(store.record("req-1", "SLOW_DELIVERY", "node-e"));
    }

    #[test]
    fn distinct_signal_types_are_independent() {
        let store = AbuseSignalStore::new();
        for i in 0..4 {
            assert!(!store.record("req-1", "SLOW_DELIVERY", &format!("node-{i}")));
        }
        for i in 0..4 {
            assert!(!store.record("req-1", "NO_SHOW", &format!("node-{i}")));
        }
    }
}
