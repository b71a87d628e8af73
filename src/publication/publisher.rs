//! The `Publisher` trait: broadcast vs topic-based dispatch (spec §4.6,
//! Open Question decision #1). Reach counts are registered-subscriber
//! matches against the node registry snapshot, not delivery
//! confirmations — nodes consent off-band and discover ACTIVE requests
//! on next poll if they're offline.

use super::registry::NodeRegistry;
use crate::model::PublicationPayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMode {
    Broadcast,
    TopicBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachReceipt {
    pub mode: DispatchMode,
    pub reach_count: usize,
}

pub trait Publisher: Send + Sync {
    fn broadcast(&self, payload: &PublicationPayload) -> ReachReceipt;
    fn publish_topic(&self, payload: &PublicationPayload, topic: &str) -> ReachReceipt;
}

/// In-process publisher backed by a `NodeRegistry` snapshot.
pub struct RegistryPublisher {
    registry: Arc<NodeRegistry>,
}

impl RegistryPublisher {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }
}

impl Publisher for RegistryPublisher {
    fn broadcast(&self, _payload: &PublicationPayload) -> ReachReceipt {
        ReachReceipt {
            mode: DispatchMode::Broadcast,
            reach_count: self.registry.all_nodes_count(),
        }
    }

    fn publish_topic(&self, _payload: &PublicationPayload, topic: &str) -> ReachReceipt {
        ReachReceipt {
            mode: DispatchMode::TopicBased,
            reach_count: self.registry.nodes_for_topic(topic),
        }
    }
}

/// Derive the coarse geo bucket / domain tag a topic-based publication
/// routes on, from the request's sanitised scope (spec §4.6).
pub fn derive_topic(payload: &PublicationPayload) -> String {
    if let Some(bucket) = payload.scope.get("geo_bucket").and_then(|v| v.as_str()) {
        return format!("geo.{bucket}");
    }
    if let Some(domain) = payload.scope.get("domain").and_then(|v| v.as_str()) {
        return format!("domain.{domain}");
    }
    "domain.general".to_string()
}
