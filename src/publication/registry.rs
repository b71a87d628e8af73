//! Node subscription registry backing the `Publisher` trait (spec §9,
//! Open Question decision #1).

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, HashSet<String>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, node_id: &str, topics: &[String]) {
        let mut nodes = self.nodes.write();
        let entry = nodes.entry(node_id.to_string()).or_default();
        entry.extend(topics.iter().cloned());
    }

    pub fn unsubscribe(&self, node_id: &str) {
        self.nodes.write().remove(node_id);
    }

    pub fn all_nodes_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn nodes_for_topic(&self, topic: &str) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|topics| topics.contains(topic))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_all_and_topic_subscribers() {
        let registry = NodeRegistry::new();
        registry.subscribe("node-1", &["domain.location".to_string()]);
        registry.subscribe("node-2", &["domain.finance".to_string()]);
        registry.subscribe("node-3", &["domain.location".to_string()]);

        assert_eq!(registry.all_nodes_count(), 3);
        assert_eq!(registry.nodes_for_topic("domain.location"), 2);
        assert_eq!(registry.nodes_for_topic("domain.finance"), 1);
    }

    #[test]
    fn unsubscribe_removes_node() {
        let registry = NodeRegistry::new();
        registry.subscribe("node-1", &["domain.health".to_string()]);
        registry.unsubscribe("node-1");
        assert_eq!(registry.all_nodes_count(), 0);
    }
}
