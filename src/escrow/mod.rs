//! C7 — Escrow Orchestrator (spec §4.7).

mod account;
pub mod integrity;

pub use account::{EscrowAccount, InMemoryEscrowAccount};
pub use integrity::{verify_integrity_proof, IntegrityProof};

use crate::audit::{AuditEventType, AuditLog};
use crate::events::EventBus;
use crate::model::{Money, RequestId, RequesterId};
use crate::policy::signer::PolicyStampSigner;
use crate::storage::Store;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldStatus {
    PendingDelivery,
    DeliveryReceived,
    Verified,
    Released,
    PartiallyReleased,
    Refunded,
    Disputed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowHold {
    pub hold_id: Uuid,
    pub contract_id: String,
    pub request_id: RequestId,
    pub requester_id: RequesterId,
    pub ds_id: String,
    pub amount: Money,
    pub contract_hash_digest: String,
    pub ds_signature: String,
    pub requester_signature: String,
    pub status: HoldStatus,
    pub released_amount: Money,
    pub refunded_amount: Money,
    pub delivery_receipt_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    PendingVerification,
    Verified,
    VerificationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub receipt_id: Uuid,
    pub hold_id: Uuid,
    pub capsule_hash_digest: String,
    pub transfer_proof: Option<String>,
    pub requester_ack: bool,
    pub submitted_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeInitiator {
    Requester,
    Ds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: Uuid,
    pub hold_id: Uuid,
    pub initiator: DisputeInitiator,
    pub reason: String,
    pub evidence_hashes: Vec<String>,
    pub status: DisputeStatus,
    pub opened_at: DateTime<Utc>,
    pub resolution: Option<String>,
    pub release_amount: Option<Money>,
    pub refund_amount: Option<Money>,
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Orchestrates the `EscrowHold` state machine (spec §4.7). Every
/// transition writes an audit receipt (where it maps onto one of the
/// exhaustive audit event types, spec §6) and emits a canonical event
/// correlated by the owning request's id.
pub struct EscrowOrchestrator {
    store: Store,
    audit: AuditLog,
    events: Arc<EventBus>,
    account: Arc<dyn EscrowAccount>,
    integrity_signer: PolicyStampSigner,
}

impl EscrowOrchestrator {
    pub fn new(
        store: Store,
        audit: AuditLog,
        events: Arc<EventBus>,
        account: Arc<dyn EscrowAccount>,
        integrity_signer: PolicyStampSigner,
    ) -> Self {
        Self {
            store,
            audit,
            events,
            account,
            integrity_signer,
        }
    }

    pub async fn get_hold(&self, hold_id: Uuid) -> Result<Option<EscrowHold>> {
        self.store.get_hold(hold_id).await
    }

    async fn emit(&self, trace_id: Uuid, event_type: &str, event_name: &str, resource_id: Uuid, actor_id: &str) {
        let _ = self
            .events
            .emit(
                trace_id,
                event_type,
                event_name,
                &format!("{event_type}:{resource_id}"),
                actor_id,
                "requester",
                &resource_id.to_string(),
                "escrow_hold",
                &serde_json::json!({}),
                event_name,
            )
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_hold(
        &self,
        contract_id: &str,
        request_id: RequestId,
        requester_id: &str,
        ds_id: &str,
        amount: Money,
        contract_hash_digest: &str,
        ds_signature: &str,
        requester_signature: &str,
    ) -> Result<EscrowHold> {
        if ds_signature.trim().is_empty() || requester_signature.trim().is_empty() {
            bail!("both ds and requester signatures are required to create a hold");
        }
        if !self
            .account
            .has_sufficient_funds(&requester_id.to_string(), amount)
            .await?
        {
            bail!("requester account has insufficient funds for hold amount");
        }

        let hold = EscrowHold {
            hold_id: Uuid::new_v4(),
            contract_id: contract_id.to_string(),
            request_id,
            requester_id: requester_id.to_string(),
            ds_id: ds_id.to_string(),
            amount,
            contract_hash_digest: contract_hash_digest.to_string(),
            ds_signature: ds_signature.to_string(),
            requester_signature: requester_signature.to_string(),
            status: HoldStatus::PendingDelivery,
            released_amount: Money::ZERO,
            refunded_amount: Money::ZERO,
            delivery_receipt_id: None,
            created_at: Utc::now(),
            released_at: None,
        };
        self.store.insert_hold(&hold).await?;
        self.audit
            .append(
                AuditEventType::EscrowLocked,
                requester_id,
                "requester",
                &hold.hold_id.to_string(),
                "escrow_hold",
                &digest(contract_hash_digest),
            )
            .await?;
        self.emit(request_id, "ESCROW_LOCKED", "escrow hold created", hold.hold_id, requester_id)
            .await;
        Ok(hold)
    }

    pub async fn submit_delivery_receipt(
        &self,
        hold_id: Uuid,
        capsule_hash: &str,
        integrity_proof: Option<IntegrityProof>,
        requester_ack: bool,
    ) -> Result<DeliveryReceipt> {
        let mut hold = self
            .store
            .get_hold(hold_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("hold not found"))?;
        if hold.status != HoldStatus::PendingDelivery {
            bail!("delivery receipt requires a hold in PENDING_DELIVERY");
        }

        let status = match &integrity_proof {
            Some(proof) => {
                if verify_integrity_proof(proof, &self.integrity_signer) {
                    DeliveryStatus::Verified
                } else {
                    DeliveryStatus::VerificationFailed
                }
            }
            None => DeliveryStatus::PendingVerification,
        };

        let receipt = DeliveryReceipt {
            receipt_id: Uuid::new_v4(),
            hold_id,
            capsule_hash_digest: digest(capsule_hash),
            transfer_proof: integrity_proof.map(|p| hex::encode(p.signature)),
            requester_ack,
            submitted_at: Utc::now(),
            status,
        };
        self.store.insert_delivery_receipt(&receipt).await?;

        hold.status = HoldStatus::DeliveryReceived;
        hold.delivery_receipt_id = Some(receipt.receipt_id);
        self.store.update_hold(&hold).await?;

        self.audit
            .append(
                AuditEventType::CapsuleCreated,
                &hold.requester_id,
                "requester",
                &hold_id.to_string(),
                "escrow_hold",
                &receipt.capsule_hash_digest,
            )
            .await?;
        self.emit(hold.request_id, "CAPSULE_CREATED", "delivery receipt submitted", hold_id, &hold.requester_id)
            .await;
        Ok(receipt)
    }

    pub async fn release_payment(&self, hold_id: Uuid) -> Result<EscrowHold> {
        let mut hold = self
            .store
            .get_hold(hold_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("hold not found"))?;
        if !matches!(hold.status, HoldStatus::DeliveryReceived | HoldStatus::Verified) {
            bail!("release requires a delivery receipt and no open dispute");
        }
        if hold.delivery_receipt_id.is_none() {
            bail!("release requires a delivery receipt");
        }
        if self.store.open_dispute_for_hold(hold_id).await?.is_some() {
            bail!("cannot release while a dispute is open");
        }

        self.account.release(hold_id, &hold.ds_id, hold.amount).await?;

        hold.status = HoldStatus::Released;
        hold.released_amount = hold.amount;
        hold.released_at = Some(Utc::now());
        self.store.update_hold(&hold).await?;

        self.audit
            .append(
                AuditEventType::EscrowReleased,
                &hold.requester_id,
                "requester",
                &hold_id.to_string(),
                "escrow_hold",
                &digest(&hold.released_amount.to_string()),
            )
            .await?;
        self.emit(hold.request_id, "ESCROW_RELEASED", "payment released", hold_id, &hold.requester_id)
            .await;
        Ok(hold)
    }

    pub async fn open_dispute(
        &self,
        hold_id: Uuid,
        initiator: DisputeInitiator,
        reason: &str,
        evidence_hashes: Vec<String>,
    ) -> Result<Dispute> {
        let mut hold = self
            .store
            .get_hold(hold_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("hold not found"))?;
        if self.store.open_dispute_for_hold(hold_id).await?.is_some() {
            bail!("at most one open dispute per hold");
        }

        let dispute = Dispute {
            dispute_id: Uuid::new_v4(),
            hold_id,
            initiator,
            reason: reason.to_string(),
            evidence_hashes,
            status: DisputeStatus::Open,
            opened_at: Utc::now(),
            resolution: None,
            release_amount: None,
            refund_amount: None,
        };
        self.store.insert_dispute(&dispute).await?;

        hold.status = HoldStatus::Disputed;
        self.store.update_hold(&hold).await?;

        self.emit(hold.request_id, "DISPUTE_OPENED", reason, hold_id, &hold.requester_id)
            .await;
        Ok(dispute)
    }

    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        resolution: &str,
        release_to_ds: Money,
        refund_to_requester: Money,
    ) -> Result<Dispute> {
        let mut dispute = self
            .store
            .get_dispute(dispute_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("dispute not found"))?;
        if dispute.status != DisputeStatus::Open {
            bail!("dispute must be OPEN to resolve");
        }
        let mut hold = self
            .store
            .get_hold(dispute.hold_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("hold not found"))?;
        if release_to_ds + refund_to_requester > hold.amount {
            bail!("release + refund must not exceed hold amount");
        }

        if release_to_ds > Money::ZERO {
            self.account.release(hold.hold_id, &hold.ds_id, release_to_ds).await?;
        }
        if refund_to_requester > Money::ZERO {
            self.account
                .refund(hold.hold_id, &hold.requester_id, refund_to_requester)
                .await?;
        }

        hold.released_amount = release_to_ds;
        hold.refunded_amount = refund_to_requester;
        hold.status = if release_to_ds == hold.amount {
            HoldStatus::Released
        } else if refund_to_requester == hold.amount {
            HoldStatus::Refunded
        } else {
            HoldStatus::PartiallyReleased
        };
        hold.released_at = Some(Utc::now());
        self.store.update_hold(&hold).await?;

        dispute.status = DisputeStatus::Resolved;
        dispute.resolution = Some(resolution.to_string());
        dispute.release_amount = Some(release_to_ds);
        dispute.refund_amount = Some(refund_to_requester);
        self.store.update_dispute(&dispute).await?;

        self.emit(hold.request_id, "DISPUTE_RESOLVED", resolution, hold.hold_id, &hold.requester_id)
            .await;
        Ok(dispute)
    }

    pub async fn process_refund(&self, hold_id: Uuid, reason: &str) -> Result<EscrowHold> {
        let mut hold = self
            .store
            .get_hold(hold_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("hold not found"))?;
        if hold.status == HoldStatus::Released {
            bail!("cannot refund an already-released hold");
        }

        self.account
            .refund(hold_id, &hold.requester_id, hold.amount - hold.released_amount)
            .await?;

        hold.refunded_amount = hold.amount - hold.released_amount;
        hold.status = HoldStatus::Refunded;
        hold.released_at = Some(Utc::now());
        self.store.update_hold(&hold).await?;

        self.audit
            .append(
                AuditEventType::EscrowRefunded,
                &hold.requester_id,
                "requester",
                &hold_id.to_string(),
                "escrow_hold",
                &digest(reason),
            )
            .await?;
        self.emit(hold.request_id, "ESCROW_REFUNDED", reason, hold_id, &hold.requester_id)
            .await;
        Ok(hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid as UuidType;

    fn orchestrator() -> (EscrowOrchestrator, Arc<InMemoryEscrowAccount>) {
        let store = Store::in_memory().unwrap();
        let audit = AuditLog::new(store.clone());
        let events = Arc::new(EventBus::new(Arc::new(store.clone())));
        let account = Arc::new(InMemoryEscrowAccount::new());
        let signer = PolicyStampSigner::new([3u8; 32]);
        (
            EscrowOrchestrator::new(store, audit, events, account.clone(), signer),
            account,
        )
    }

    #[tokio::test]
    async fn full_happy_path_releases_full_amount() {
        let (orch, account) = orchestrator();
        account.fund(&"req-1".to_string(), Decimal::new(10000, 2));

        let hold = orch
            .create_hold("c1", UuidType::new_v4(), "req-1", "ds-1", Decimal::new(10000, 2), "hash", "ds-sig", "req-sig")
            .await
            .unwrap();
        assert_eq!(hold.status, HoldStatus::PendingDelivery);

        orch.submit_delivery_receipt(hold.hold_id, "abc", None, true).await.unwrap();
        let released = orch.release_payment(hold.hold_id).await.unwrap();
        assert_eq!(released.status, HoldStatus::Released);
        assert_eq!(released.released_amount, Decimal::new(10000, 2));
    }

    #[tokio::test]
    async fn insufficient_funds_blocks_hold_creation() {
        let (orch, _account) = orchestrator();
        let result = orch
            .create_hold("c1", UuidType::new_v4(), "req-1", "ds-1", Decimal::new(10000, 2), "hash", "ds-sig", "req-sig")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispute_blocks_release_until_resolved() {
        let (orch, account) = orchestrator();
        account.fund(&"req-1".to_string(), Decimal::new(10000, 2));
        let hold = orch
            .create_hold("c1", UuidType::new_v4(), "req-1", "ds-1", Decimal::new(10000, 2), "hash", "ds-sig", "req-sig")
            .await
            .unwrap();
        orch.submit_delivery_receipt(hold.hold_id, "abc", None, true).await.unwrap();
        let dispute = orch
            .open_dispute(hold.hold_id, DisputeInitiator::Requester, "bad data", vec!["h1".to_string()])
            .await
            .unwrap();

        assert!(orch.release_payment(hold.hold_id).await.is_err());

        let resolved = orch
            .resolve_dispute(dispute.dispute_id, "partial refund", Decimal::new(6000, 2), Decimal::new(4000, 2))
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);

        let final_hold = orch.get_hold(hold.hold_id).await.unwrap().unwrap();
        assert_eq!(final_hold.status, HoldStatus::PartiallyReleased);
        assert!(final_hold.released_amount + final_hold.refunded_amount <= final_hold.amount);
    }
}
