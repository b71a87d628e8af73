//! C1 — Audit Log.
//!
//! Append-only, hash-chained receipt store; the primitive every other
//! component writes through. Grounded on `vault/vault_db.rs`'s
//! connection-behind-a-mutex persistence idiom, with the hash-chaining
//! shape learned from `other_examples/8f8531b7_Ian-Reitsma-the-block__node-src-receipt_audit.rs`.

use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The exhaustive audit event types named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    RequestCreated,
    RequestScreened,
    RequestMatched,
    UnauthorizedFieldAccessAttempt,
    EscrowLocked,
    EscrowReleased,
    EscrowRefunded,
    CapsuleCreated,
}

impl AuditEventType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AuditEventType::RequestCreated => "REQUEST_CREATED",
            AuditEventType::RequestScreened => "REQUEST_SCREENED",
            AuditEventType::RequestMatched => "REQUEST_MATCHED",
            AuditEventType::UnauthorizedFieldAccessAttempt => "UNAUTHORIZED_FIELD_ACCESS_ATTEMPT",
            AuditEventType::EscrowLocked => "ESCROW_LOCKED",
            AuditEventType::EscrowReleased => "ESCROW_RELEASED",
            AuditEventType::EscrowRefunded => "ESCROW_REFUNDED",
            AuditEventType::CapsuleCreated => "CAPSULE_CREATED",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "REQUEST_SCREENED" => AuditEventType::RequestScreened,
            "REQUEST_MATCHED" => AuditEventType::RequestMatched,
            "UNAUTHORIZED_FIELD_ACCESS_ATTEMPT" => AuditEventType::UnauthorizedFieldAccessAttempt,
            "ESCROW_LOCKED" => AuditEventType::EscrowLocked,
            "ESCROW_RELEASED" => AuditEventType::EscrowReleased,
            "ESCROW_REFUNDED" => AuditEventType::EscrowRefunded,
            "CAPSULE_CREATED" => AuditEventType::CapsuleCreated,
            _ => AuditEventType::RequestCreated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub seq: i64,
    pub event_type: AuditEventType,
    pub actor_id: String,
    pub actor_type: String,
    pub resource_id: String,
    pub resource_type: String,
    pub details_hash: String,
    pub prev_hash: String,
    pub receipt_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only hash-chained audit log. One instance per process, shared
/// behind an `Arc` by every other component.
#[derive(Clone)]
pub struct AuditLog {
    store: Store,
}

impl AuditLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// `append(event_type, actor, resource, details_hash) -> receipt`.
    ///
    /// Storage I/O failure is fatal to the calling transaction (spec
    /// §4.1): callers propagate the error rather than treating a partial
    /// write as having happened.
    pub async fn append(
        &self,
        event_type: AuditEventType,
        actor_id: &str,
        actor_type: &str,
        resource_id: &str,
        resource_type: &str,
        details_hash: &str,
    ) -> anyhow::Result<AuditReceipt> {
        let prev_hash = self.store.audit_tail_hash().await?;
        let timestamp = Utc::now();

        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            event_type.as_wire(),
            actor_id,
            actor_type,
            resource_id,
            resource_type,
            details_hash,
            timestamp.to_rfc3339(),
        );
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(b"|");
        hasher.update(canonical.as_bytes());
        let receipt_hash = hex::encode(hasher.finalize());

        let receipt = AuditReceipt {
            seq: 0, // assigned by storage
            event_type,
            actor_id: actor_id.to_string(),
            actor_type: actor_type.to_string(),
            resource_id: resource_id.to_string(),
            resource_type: resource_type.to_string(),
            details_hash: details_hash.to_string(),
            prev_hash,
            receipt_hash,
            timestamp,
        };

        self.store.append_audit_receipt(&receipt).await?;
        Ok(receipt)
    }

    pub async fn by_actor(&self, actor_id: &str, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditReceipt>> {
        self.store.audit_by_actor(actor_id, limit, offset).await
    }

    pub async fn by_resource(&self, resource_id: &str, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditReceipt>> {
        self.store.audit_by_resource(resource_id, limit, offset).await
    }

    pub async fn by_type(&self, event_type: AuditEventType, limit: i64, offset: i64) -> anyhow::Result<Vec<AuditReceipt>> {
        self.store.audit_by_type(event_type, limit, offset).await
    }

    /// Canonical byte stream for external verification: each receipt's
    /// chain can be recomputed independently of this process.
    pub async fn export_canonical(&self) -> anyhow::Result<Vec<u8>> {
        let receipts = self.store.audit_export_all().await?;
        let mut out = Vec::new();
        for r in receipts {
            out.extend_from_slice(r.receipt_hash.as_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }

    /// Hash a details payload into the `details_hash` field callers pass
    /// to `append`, keeping raw details out of the chain itself.
    pub fn hash_details(details: &impl Serialize) -> String {
        let bytes = serde_json::to_vec(details).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn log() -> AuditLog {
        AuditLog::new(Store::in_memory().unwrap())
    }

    #[tokio::test]
    async fn chain_links_to_previous_receipt() {
        let log = log().await;
        let r1 = log
            .append(AuditEventType::RequestCreated, "req-1", "requester", "res-1", "request", "abc")
            .await
            .unwrap();
        let r2 = log
            .append(AuditEventType::RequestScreened, "req-1", "requester", "res-1", "request", "def")
            .await
            .unwrap();
        assert_eq!(r2.prev_hash, r1.receipt_hash);
        assert_ne!(r1.receipt_hash, r2.receipt_hash);
    }

    #[tokio::test]
    async fn genesis_hash_is_stable() {
        let log = log().await;
        let r1 = log
            .append(AuditEventType::RequestCreated, "req-1", "requester", "res-1", "request", "abc")
            .await
            .unwrap();
        assert_eq!(r1.prev_hash, "0".repeat(64));
    }

    #[tokio::test]
    async fn scans_by_actor_and_resource_and_type() {
        let log = log().await;
        log.append(AuditEventType::RequestCreated, "req-1", "requester", "res-1", "request", "a")
            .await
            .unwrap();
        log.append(AuditEventType::UnauthorizedFieldAccessAttempt, "req-1", "requester", "res-2", "request", "b")
            .await
            .unwrap();

        assert_eq!(log.by_actor("req-1", 10, 0).await.unwrap().len(), 2);
        assert_eq!(log.by_resource("res-1", 10, 0).await.unwrap().len(), 1);
        assert_eq!(
            log.by_type(AuditEventType::UnauthorizedFieldAccessAttempt, 10, 0)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
