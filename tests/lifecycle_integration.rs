//! End-to-end exercise of the draft -> screening -> active -> publish ->
//! hold -> delivery receipt -> release pipeline (spec §4.3-§4.8),
//! against a file-backed sqlite store, including a restart to confirm
//! persisted rows round-trip through storage correctly.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use yachaq_coordinator::audit::AuditLog;
use yachaq_coordinator::escrow::{EscrowOrchestrator, HoldStatus, InMemoryEscrowAccount};
use yachaq_coordinator::events::EventBus;
use yachaq_coordinator::lifecycle::{LifecycleCoordinator, SubmitOutcome};
use yachaq_coordinator::model::{RequestInput, RequestStatus};
use yachaq_coordinator::policy::signer::PolicyStampSigner;
use yachaq_coordinator::publication::{DispatchMode, NodeRegistry, PublicationService, RegistryPublisher};
use yachaq_coordinator::reputation::{RateLimitCaps, ReputationService};
use yachaq_coordinator::storage::Store;

fn clean_input() -> RequestInput {
    RequestInput {
        requester_id: "req-acme".to_string(),
        purpose: "market research".to_string(),
        scope: BTreeMap::from([("domain".to_string(), json!("account_type"))]),
        criteria: BTreeMap::new(),
        metadata: BTreeMap::new(),
        duration_start: Utc::now(),
        duration_end: Utc::now() + chrono::Duration::days(1),
        unit_price: Decimal::new(500, 2),
        participant_cap: 25,
    }
}

#[tokio::test]
async fn full_request_to_payout_flow_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("coordinator.db");
    let db_path = db_path.to_str().unwrap().to_string();

    let store = Store::open(&db_path).unwrap();
    let audit = AuditLog::new(store.clone());
    let reputation = Arc::new(ReputationService::new(
        Arc::new(store.clone()),
        RateLimitCaps::default(),
        0.0,
    ));
    let events = Arc::new(EventBus::new(Arc::new(store.clone())));
    let registry = Arc::new(NodeRegistry::new());
    registry.subscribe("node-1", &[]);
    let publisher = Arc::new(RegistryPublisher::new(registry));
    let publication = Arc::new(PublicationService::new(audit.clone(), events.clone(), publisher));
    let signer = PolicyStampSigner::new([7u8; 32]);
    let lifecycle = LifecycleCoordinator::new(
        store.clone(),
        audit.clone(),
        reputation.clone(),
        publication.clone(),
        events.clone(),
        signer,
        "v1".to_string(),
    );

    let outcome = lifecycle.submit_request("req-acme", clean_input()).await.unwrap();
    let request = match outcome {
        SubmitOutcome::Submitted { request, .. } => *request,
        other => panic!("expected Submitted, got {other:?}"),
    };
    assert_eq!(request.status, RequestStatus::Active);

    let receipt = lifecycle
        .publish_request(request.request_id, DispatchMode::Broadcast)
        .await
        .unwrap();
    assert_eq!(receipt.reach_count, 1);

    let events = Arc::new(EventBus::new(Arc::new(store.clone())));
    let escrow_account = Arc::new(InMemoryEscrowAccount::new());
    escrow_account.fund(&"req-acme".to_string(), Decimal::new(50000, 2));
    let integrity_signer = PolicyStampSigner::new([9u8; 32]);
    let escrow = EscrowOrchestrator::new(store.clone(), audit.clone(), events, escrow_account, integrity_signer);

    let hold = escrow
        .create_hold(
            "contract-1",
            request.request_id,
            "req-acme",
            "ds-1",
            Decimal::new(50000, 2),
            "contract-hash",
            "ds-sig",
            "requester-sig",
        )
        .await
        .unwrap();
    assert_eq!(hold.status, HoldStatus::PendingDelivery);

    escrow
        .submit_delivery_receipt(hold.hold_id, "capsule-hash", None, true)
        .await
        .unwrap();

    let released = escrow.release_payment(hold.hold_id).await.unwrap();
    assert_eq!(released.status, HoldStatus::Released);
    assert_eq!(released.released_amount, Decimal::new(50000, 2));

    // Drop every in-process handle and reopen the same on-disk database to
    // confirm the persisted rows (ids included) round-trip correctly.
    drop(lifecycle);
    drop(escrow);
    drop(store);

    let reopened = Store::open(&db_path).unwrap();
    let reloaded_request = reopened.get_request(request.request_id).await.unwrap().unwrap();
    assert_eq!(reloaded_request.request_id, request.request_id);
    assert_eq!(reloaded_request.status, RequestStatus::Active);

    let reloaded_hold = reopened.get_hold(hold.hold_id).await.unwrap().unwrap();
    assert_eq!(reloaded_hold.hold_id, hold.hold_id);
    assert_eq!(reloaded_hold.status, HoldStatus::Released);
    assert_eq!(reloaded_hold.released_amount, Decimal::new(50000, 2));
}

#[tokio::test]
async fn raw_data_in_scope_is_rejected_before_persistence() {
    let store = Store::in_memory().unwrap();
    let audit = AuditLog::new(store.clone());
    let reputation = Arc::new(ReputationService::new(
        Arc::new(store.clone()),
        RateLimitCaps::default(),
        0.0,
    ));
    let events = Arc::new(EventBus::new(Arc::new(store.clone())));
    let registry = Arc::new(NodeRegistry::new());
    let publisher = Arc::new(RegistryPublisher::new(registry));
    let publication = Arc::new(PublicationService::new(audit.clone(), events.clone(), publisher));
    let signer = PolicyStampSigner::new([1u8; 32]);
    let lifecycle = LifecycleCoordinator::new(store, audit, reputation.clone(), publication, events, signer, "v1".to_string());

    let mut input = clean_input();
    input.scope.insert("ssn".to_string(), json!("123-45-6789"));
    let outcome = lifecycle.submit_request("req-acme", input).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::RawDataRejected(_)));

    let reputation = reputation.get_or_init("req-acme").await.unwrap();
    assert_eq!(reputation.score, 40.0);
}
