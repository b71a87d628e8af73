//! C6 — Publication & Rendezvous (spec §4.6).

mod entropy;
mod publisher;
mod registry;
mod rendezvous;

pub use entropy::{looks_like_ciphertext, shannon_entropy, MIN_ENTROPY_BITS_PER_BYTE};
pub use publisher::{derive_topic, DispatchMode, Publisher, ReachReceipt, RegistryPublisher};
pub use registry::NodeRegistry;
pub use rendezvous::{CreatedSession, RendezvousSession, RendezvousStore, SessionStatus, TokenValidation, MAX_SESSION_TTL};

use crate::audit::{AuditEventType, AuditLog};
use crate::events::EventBus;
use crate::model::{PublicationPayload, Request};
use anyhow::Result;
use std::sync::Arc;

/// Ties the sanitised-projection build, dispatch, audit write and
/// canonical event emission together for a single publish call (spec
/// §4.6, §4.9).
pub struct PublicationService {
    audit: AuditLog,
    events: Arc<EventBus>,
    publisher: Arc<dyn Publisher>,
}

impl PublicationService {
    pub fn new(audit: AuditLog, events: Arc<EventBus>, publisher: Arc<dyn Publisher>) -> Self {
        Self { audit, events, publisher }
    }

    pub fn build_payload(request: &Request) -> PublicationPayload {
        PublicationPayload {
            request_id: request.request_id,
            requester_id: request.requester_id.clone(),
            purpose: request.purpose.clone(),
            scope: request.scope.clone(),
            criteria: request.criteria.clone(),
            unit_price: request.unit_price,
            participant_cap: request.participant_cap,
            duration_start: request.duration_start,
            duration_end: request.duration_end,
        }
    }

    /// Requires the request to already be ACTIVE (enforced by the
    /// lifecycle coordinator before calling this).
    pub async fn publish(&self, request: &Request, mode: DispatchMode) -> Result<ReachReceipt> {
        let payload = Self::build_payload(request);
        let receipt = match mode {
            DispatchMode::Broadcast => self.publisher.broadcast(&payload),
            DispatchMode::TopicBased => {
                let topic = derive_topic(&payload);
                self.publisher.publish_topic(&payload, &topic)
            }
        };

        self.audit
            .append(
                AuditEventType::RequestMatched,
                &request.requester_id,
                "requester",
                &request.request_id.to_string(),
                "request",
                &AuditLog::hash_details(&receipt.reach_count),
            )
            .await?;
        let _ = self
            .events
            .emit(
                request.request_id,
                "REQUEST_MATCHED",
                "REQUEST_MATCHED",
                &format!("REQUEST_MATCHED:{}", request.request_id),
                &request.requester_id,
                "requester",
                &request.request_id.to_string(),
                "request",
                &serde_json::json!({ "reach_count": receipt.reach_count }),
                "request matched and dispatched",
            )
            .await;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestStatus;
    use crate::storage::Store;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn request() -> Request {
        Request {
            request_id: Uuid::new_v4(),
            requester_id: "req-1".to_string(),
            purpose: "x".to_string(),
            scope: BTreeMap::from([("domain".to_string(), json!("location"))]),
            criteria: BTreeMap::new(),
            duration_start: Utc::now(),
            duration_end: Utc::now() + chrono::Duration::days(1),
            unit_price: Decimal::new(100, 2),
            participant_cap: 10,
            status: RequestStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_writes_request_matched_receipt() {
        let store = Store::in_memory().unwrap();
        let audit = AuditLog::new(store.clone());
        let events = Arc::new(EventBus::new(Arc::new(store)));
        let registry = Arc::new(NodeRegistry::new());
        registry.subscribe("node-1", &[]);
        let publisher = Arc::new(RegistryPublisher::new(registry));
        let service = PublicationService::new(audit.clone(), events, publisher);

        let receipt = service.publish(&request(), DispatchMode::Broadcast).await.unwrap();
        assert_eq!(receipt.reach_count, 1);

        let receipts = audit.by_type(AuditEventType::RequestMatched, 10, 0).await.unwrap();
        assert_eq!(receipts.len(), 1);
    }
}
