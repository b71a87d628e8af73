//! HTTP surface (spec §G): thin handlers that deserialize JSON, call into
//! C5–C9, and map results through `CoordinatorError`'s `IntoResponse`.

use crate::audit::AuditLog;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::escrow::{Dispute, DisputeInitiator, EscrowHold, EscrowOrchestrator, IntegrityProof};
use crate::events::EventBus;
use crate::lifecycle::{LifecycleCoordinator, SubmitOutcome};
use crate::model::{Money, Request, RequestId, RequestInput};
use crate::policy::PolicyDecision;
use crate::publication::{CreatedSession, DispatchMode, PublicationService, ReachReceipt, RendezvousStore};
use crate::reputation::{Reputation, ReputationService};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleCoordinator>,
    pub escrow: Arc<EscrowOrchestrator>,
    pub reputation: Arc<ReputationService>,
    pub publication: Arc<PublicationService>,
    pub events: Arc<EventBus>,
    pub rendezvous: Arc<RendezvousStore>,
    pub audit: AuditLog,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/requests", post(submit_request))
        .route("/api/requests/:id", get(get_request))
        .route("/api/requests/:id/review", post(review_request))
        .route("/api/requests/:id/publish", post(publish_request))
        .route("/api/escrow/holds", post(create_hold))
        .route("/api/escrow/holds/:id", get(get_hold))
        .route("/api/escrow/holds/:id/delivery", post(submit_delivery))
        .route("/api/escrow/holds/:id/release", post(release_payment))
        .route("/api/escrow/holds/:id/dispute", post(open_dispute))
        .route("/api/escrow/holds/:id/refund", post(process_refund))
        .route("/api/disputes/:id/resolve", post(resolve_dispute))
        .route("/api/rendezvous/sessions", post(create_session))
        .route("/api/rendezvous/sessions/:id/relay", post(relay_message))
        .route("/api/rendezvous/sessions/:id/messages/:receiver", get(retrieve_message))
        .route("/api/reputation/:requester_id", get(get_reputation))
        .route("/api/audit/:resource_id", get(get_audit_trail))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn precondition<T>(result: anyhow::Result<T>) -> CoordinatorResult<T> {
    result.map_err(|e| CoordinatorError::Precondition(e.to_string()))
}

// -- Requests (C8) ----------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "outcome")]
enum SubmitRequestResponse {
    SchemaInvalid { codes: Vec<String> },
    RawDataRejected { codes: Vec<String> },
    Submitted { request: Request, decision: PolicyDecision },
}

async fn submit_request(
    State(state): State<AppState>,
    Json(input): Json<RequestInput>,
) -> CoordinatorResult<Json<SubmitRequestResponse>> {
    let requester_id = input.requester_id.clone();
    let outcome = precondition(state.lifecycle.submit_request(&requester_id, input).await)?;
    let response = match outcome {
        SubmitOutcome::SchemaInvalid(codes) => SubmitRequestResponse::SchemaInvalid { codes },
        SubmitOutcome::RawDataRejected(codes) => SubmitRequestResponse::RawDataRejected { codes },
        SubmitOutcome::Submitted { request, review } => SubmitRequestResponse::Submitted {
            request: *request,
            decision: review.decision,
        },
    };
    Ok(Json(response))
}

async fn get_request(State(state): State<AppState>, Path(id): Path<RequestId>) -> CoordinatorResult<Json<Request>> {
    let request = state
        .lifecycle
        .get_request(id)
        .await
        .map_err(CoordinatorError::from)?
        .ok_or_else(|| CoordinatorError::NotFound(format!("request {id}")))?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct ReviewRequestBody {
    decision: PolicyDecision,
    #[serde(default)]
    safeguards: Vec<String>,
}

async fn review_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Json(body): Json<ReviewRequestBody>,
) -> CoordinatorResult<Json<Request>> {
    let request = precondition(state.lifecycle.attach_stamp(id, body.decision, body.safeguards).await)?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct PublishRequestBody {
    #[serde(default)]
    topic_based: bool,
}

async fn publish_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Json(body): Json<PublishRequestBody>,
) -> CoordinatorResult<Json<ReachReceipt>> {
    let mode = if body.topic_based { DispatchMode::TopicBased } else { DispatchMode::Broadcast };
    let receipt = precondition(state.lifecycle.publish_request(id, mode).await)?;
    Ok(Json(receipt))
}

// -- Escrow (C7) --------------------------------------------------------

#[derive(Deserialize)]
struct CreateHoldBody {
    contract_id: String,
    request_id: RequestId,
    requester_id: String,
    ds_id: String,
    amount: Money,
    contract_hash_digest: String,
    ds_signature: String,
    requester_signature: String,
}

async fn create_hold(State(state): State<AppState>, Json(body): Json<CreateHoldBody>) -> CoordinatorResult<Json<EscrowHold>> {
    let hold = precondition(
        state
            .escrow
            .create_hold(
                &body.contract_id,
                body.request_id,
                &body.requester_id,
                &body.ds_id,
                body.amount,
                &body.contract_hash_digest,
                &body.ds_signature,
                &body.requester_signature,
            )
            .await,
    )?;
    Ok(Json(hold))
}

async fn get_hold(State(state): State<AppState>, Path(id): Path<Uuid>) -> CoordinatorResult<Json<EscrowHold>> {
    let hold = state
        .escrow
        .get_hold(id)
        .await
        .map_err(CoordinatorError::from)?
        .ok_or_else(|| CoordinatorError::NotFound(format!("escrow hold {id}")))?;
    Ok(Json(hold))
}

#[derive(Deserialize)]
struct SubmitDeliveryBody {
    capsule_hash: String,
    #[serde(default)]
    integrity_proof: Option<IntegrityProof>,
    requester_ack: bool,
}

async fn submit_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitDeliveryBody>,
) -> CoordinatorResult<Json<crate::escrow::DeliveryReceipt>> {
    let receipt = precondition(
        state
            .escrow
            .submit_delivery_receipt(id, &body.capsule_hash, body.integrity_proof, body.requester_ack)
            .await,
    )?;
    Ok(Json(receipt))
}

async fn release_payment(State(state): State<AppState>, Path(id): Path<Uuid>) -> CoordinatorResult<Json<EscrowHold>> {
    let hold = precondition(state.escrow.release_payment(id).await)?;
    Ok(Json(hold))
}

#[derive(Deserialize)]
struct OpenDisputeBody {
    initiator: DisputeInitiator,
    reason: String,
    #[serde(default)]
    evidence_hashes: Vec<String>,
}

async fn open_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OpenDisputeBody>,
) -> CoordinatorResult<Json<Dispute>> {
    let dispute = precondition(
        state
            .escrow
            .open_dispute(id, body.initiator, &body.reason, body.evidence_hashes)
            .await,
    )?;
    Ok(Json(dispute))
}

#[derive(Deserialize)]
struct ResolveDisputeBody {
    resolution: String,
    release_to_ds: Money,
    refund_to_requester: Money,
}

async fn resolve_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveDisputeBody>,
) -> CoordinatorResult<Json<Dispute>> {
    let dispute = precondition(
        state
            .escrow
            .resolve_dispute(id, &body.resolution, body.release_to_ds, body.refund_to_requester)
            .await,
    )?;
    Ok(Json(dispute))
}

#[derive(Deserialize)]
struct ProcessRefundBody {
    reason: String,
}

async fn process_refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProcessRefundBody>,
) -> CoordinatorResult<Json<EscrowHold>> {
    let hold = precondition(state.escrow.process_refund(id, &body.reason).await)?;
    Ok(Json(hold))
}

// -- Rendezvous (C6) ------------------------------------------------------

#[derive(Deserialize)]
struct CreateSessionBody {
    ds_ephemeral_id: String,
    requester_ephemeral_id: String,
    ttl_secs: i64,
    relay_url: String,
    #[serde(default)]
    ice_servers: Vec<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
    token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Json<CreateSessionResponse> {
    let CreatedSession { session_id, token, expires_at } = state.rendezvous.create_session(
        &body.ds_ephemeral_id,
        &body.requester_ephemeral_id,
        chrono::Duration::seconds(body.ttl_secs.max(1)),
        &body.relay_url,
        body.ice_servers,
    );
    Json(CreateSessionResponse { session_id, token, expires_at })
}

#[derive(Deserialize)]
struct RelayMessageBody {
    ciphertext_base64: String,
    sender_ephemeral_id: String,
}

async fn relay_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RelayMessageBody>,
) -> CoordinatorResult<Json<serde_json::Value>> {
    use base64::Engine;
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(&body.ciphertext_base64)
        .map_err(|e| CoordinatorError::Validation(vec![format!("invalid base64: {e}")]))?;
    state
        .rendezvous
        .relay(&id, ciphertext, &body.sender_ephemeral_id)
        .map_err(|e| CoordinatorError::Precondition(e.to_string()))?;
    Ok(Json(json!({ "relayed": true })))
}

async fn retrieve_message(
    State(state): State<AppState>,
    Path((id, receiver)): Path<(String, String)>,
) -> Json<serde_json::Value> {
    use base64::Engine;
    match state.rendezvous.retrieve(&id, &receiver) {
        Some(bytes) => Json(json!({ "ciphertext_base64": base64::engine::general_purpose::STANDARD.encode(bytes) })),
        None => Json(json!({ "ciphertext_base64": null })),
    }
}

// -- Reputation (C5) and Audit (C1) --------------------------------------

async fn get_reputation(
    State(state): State<AppState>,
    Path(requester_id): Path<String>,
) -> CoordinatorResult<Json<Reputation>> {
    let reputation = state.reputation.get_or_init(&requester_id).await.map_err(CoordinatorError::from)?;
    Ok(Json(reputation))
}

async fn get_audit_trail(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> CoordinatorResult<Json<Vec<crate::audit::AuditReceipt>>> {
    let receipts = state.audit.by_resource(&resource_id, 100, 0).await.map_err(CoordinatorError::from)?;
    Ok(Json(receipts))
}
