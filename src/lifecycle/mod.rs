//! C8 — Request Lifecycle Coordinator (spec §4.8). Sequences C3 (intake),
//! C4 (policy review), C5 (reputation) and C6 (publication) around the
//! `Request` state machine:
//!
//! ```text
//! DRAFT --(submit)--> SCREENING --(approve)--> ACTIVE --(publish)--> ACTIVE
//!                           |                       |
//!                           +--(reject)--> REJECTED +--(expiry/cap)--> COMPLETED
//! ```

use crate::audit::{AuditEventType, AuditLog};
use crate::events::EventBus;
use crate::intake::{self, IntakeOutcome};
use crate::model::{Request, RequestId, RequestInput, RequestStatus};
use crate::policy::signer::PolicyStampSigner;
use crate::policy::{self, PolicyDecision, PolicyReviewResult};
use crate::publication::{DispatchMode, PublicationService, ReachReceipt};
use crate::reputation::{ReputationEventType, ReputationService};
use crate::storage::Store;
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug)]
pub enum SubmitOutcome {
    SchemaInvalid(Vec<String>),
    RawDataRejected(Vec<String>),
    Submitted { request: Box<Request>, review: PolicyReviewResult },
}

pub struct LifecycleCoordinator {
    store: Store,
    audit: AuditLog,
    reputation: Arc<ReputationService>,
    publication: Arc<PublicationService>,
    events: Arc<EventBus>,
    signer: PolicyStampSigner,
    policy_version: String,
}

impl LifecycleCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        audit: AuditLog,
        reputation: Arc<ReputationService>,
        publication: Arc<PublicationService>,
        events: Arc<EventBus>,
        signer: PolicyStampSigner,
        policy_version: String,
    ) -> Self {
        Self {
            store,
            audit,
            reputation,
            publication,
            events,
            signer,
            policy_version,
        }
    }

    pub async fn get_request(&self, request_id: RequestId) -> Result<Option<Request>> {
        self.store.get_request(request_id).await
    }

    /// `store_request` (spec §4.3) + the DRAFT->SCREENING transition and
    /// automatic policy review that follow immediately on submission.
    pub async fn submit_request(&self, requester_id: &str, input: RequestInput) -> Result<SubmitOutcome> {
        match intake::evaluate(&input) {
            IntakeOutcome::SchemaInvalid(codes) => Ok(SubmitOutcome::SchemaInvalid(codes)),
            IntakeOutcome::RawDataRejected(codes) => {
                self.audit
                    .append(
                        AuditEventType::UnauthorizedFieldAccessAttempt,
                        requester_id,
                        "requester",
                        requester_id,
                        "requester",
                        &AuditLog::hash_details(&codes),
                    )
                    .await?;
                self.reputation
                    .record_event(requester_id, ReputationEventType::TargetingAttempt, codes.join(","))
                    .await?;
                Ok(SubmitOutcome::RawDataRejected(codes))
            }
            IntakeOutcome::Accepted { scope, criteria } => {
                let request = Request {
                    request_id: uuid::Uuid::new_v4(),
                    requester_id: requester_id.to_string(),
                    purpose: input.purpose,
                    scope,
                    criteria,
                    duration_start: input.duration_start,
                    duration_end: input.duration_end,
                    unit_price: input.unit_price,
                    participant_cap: input.participant_cap,
                    status: RequestStatus::Screening,
                    created_at: Utc::now(),
                };
                self.store.insert_request(&request).await?;
                self.audit
                    .append(
                        AuditEventType::RequestCreated,
                        requester_id,
                        "requester",
                        &request.request_id.to_string(),
                        "request",
                        &AuditLog::hash_details(&request.purpose),
                    )
                    .await?;
                self.reputation
                    .record_event(requester_id, ReputationEventType::SuccessfulRequest, "request submitted")
                    .await?;
                let _ = self
                    .events
                    .emit(
                        request.request_id,
                        "REQUEST_CREATED",
                        "REQUEST_CREATED",
                        &format!("REQUEST_CREATED:{}", request.request_id),
                        requester_id,
                        "requester",
                        &request.request_id.to_string(),
                        "request",
                        &serde_json::json!({}),
                        "request submitted",
                    )
                    .await;

                let review = policy::review_request(&request);
                let request = self.apply_review(request, &review).await?;
                Ok(SubmitOutcome::Submitted { request: Box::new(request), review })
            }
        }
    }

    /// Applies an automatic decision (Approved/Rejected); ManualReview
    /// leaves the request in SCREENING pending `attach_stamp`.
    async fn apply_review(&self, request: Request, review: &PolicyReviewResult) -> Result<Request> {
        match review.decision {
            PolicyDecision::ManualReview => Ok(request),
            decision => self.attach_stamp(request.request_id, decision, review.safeguards.clone()).await,
        }
    }

    /// `attach_stamp(request_id, approval)` (spec §4.4): requires
    /// SCREENING, writes `REQUEST_SCREENED`, transitions to ACTIVE or
    /// REJECTED, persists the signed stamp.
    pub async fn attach_stamp(
        &self,
        request_id: RequestId,
        decision: PolicyDecision,
        safeguards: Vec<String>,
    ) -> Result<Request> {
        let mut request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("request not found"))?;
        if request.status != RequestStatus::Screening {
            bail!("attach_stamp requires a request in SCREENING");
        }

        let stamp = self
            .signer
            .sign(request_id, decision, safeguards, self.policy_version.clone());
        self.store.insert_policy_stamp(&stamp).await?;

        request.status = match decision {
            PolicyDecision::Approved => RequestStatus::Active,
            _ => RequestStatus::Rejected,
        };
        self.store.set_request_status(request_id, request.status).await?;

        self.audit
            .append(
                AuditEventType::RequestScreened,
                &request.requester_id,
                "requester",
                &request_id.to_string(),
                "request",
                &stamp.stamp_hash,
            )
            .await?;
        Ok(request)
    }

    /// Requires ACTIVE (spec §4.6).
    pub async fn publish_request(&self, request_id: RequestId, mode: DispatchMode) -> Result<ReachReceipt> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("request not found"))?;
        if request.status != RequestStatus::Active {
            bail!("publication requires a request in ACTIVE");
        }
        self.publication.publish(&request, mode).await
    }

    /// Terminal transition on expiry or participant-cap reached.
    pub async fn complete_request(&self, request_id: RequestId) -> Result<()> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("request not found"))?;
        if request.status != RequestStatus::Active {
            bail!("completion requires a request in ACTIVE");
        }
        self.store.set_request_status(request_id, RequestStatus::Completed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{NodeRegistry, RegistryPublisher};
    use crate::reputation::RateLimitCaps;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn coordinator() -> LifecycleCoordinator {
        let store = Store::in_memory().unwrap();
        let audit = AuditLog::new(store.clone());
        let reputation = Arc::new(ReputationService::new(Arc::new(store.clone()), RateLimitCaps::default(), 0.0));
        let events = Arc::new(EventBus::new(Arc::new(store.clone())));
        let registry = Arc::new(NodeRegistry::new());
        let publisher = Arc::new(RegistryPublisher::new(registry));
        let publication = Arc::new(PublicationService::new(audit.clone(), events.clone(), publisher));
        let signer = PolicyStampSigner::new([1u8; 32]);
        LifecycleCoordinator::new(store, audit, reputation, publication, events, signer, "v1".to_string())
    }

    fn valid_input() -> RequestInput {
        RequestInput {
            requester_id: "req-1".to_string(),
            purpose: "market research".to_string(),
            scope: BTreeMap::from([("domain".to_string(), json!("account_type"))]),
            criteria: BTreeMap::new(),
            metadata: BTreeMap::new(),
            duration_start: Utc::now(),
            duration_end: Utc::now() + chrono::Duration::days(1),
            unit_price: Decimal::new(100, 2),
            participant_cap: 10,
        }
    }

    #[tokio::test]
    async fn clean_request_becomes_active_and_publishable() {
        let coordinator = coordinator();
        let outcome = coordinator.submit_request("req-1", valid_input()).await.unwrap();
        let request = match outcome {
            SubmitOutcome::Submitted { request, .. } => request,
            other => panic!("expected Submitted, got {other:?}"),
        };
        assert_eq!(request.status, RequestStatus::Active);

        let receipt = coordinator
            .publish_request(request.request_id, DispatchMode::Broadcast)
            .await
            .unwrap();
        assert_eq!(receipt.reach_count, 0);
    }

    #[tokio::test]
    async fn raw_data_rejected_and_reputation_penalised() {
        let coordinator = coordinator();
        let mut input = valid_input();
        input.scope.insert("ssn".to_string(), json!("123-45-6789"));
        let outcome = coordinator.submit_request("req-1", input).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::RawDataRejected(_)));

        let reputation = coordinator.reputation.get_or_init("req-1").await.unwrap();
        assert_eq!(reputation.score, 40.0);
    }

    #[tokio::test]
    async fn manual_review_leaves_request_in_screening() {
        let coordinator = coordinator();
        let mut input = valid_input();
        input.purpose = "track children's shopping habits".to_string();
        let outcome = coordinator.submit_request("req-1", input).await.unwrap();
        let request = match outcome {
            SubmitOutcome::Submitted { request, .. } => request,
            other => panic!("expected Submitted, got {other:?}"),
        };
        assert_eq!(request.status, RequestStatus::Screening);
    }
}
