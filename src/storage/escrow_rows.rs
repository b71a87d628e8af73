use crate::escrow::{DeliveryReceipt, DeliveryStatus, Dispute, DisputeInitiator, DisputeStatus, EscrowHold, HoldStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS escrow_holds (
            hold_id TEXT PRIMARY KEY,
            contract_id TEXT NOT NULL,
            request_id TEXT NOT NULL,
            requester_id TEXT NOT NULL,
            ds_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            contract_hash_digest TEXT NOT NULL,
            ds_signature TEXT NOT NULL,
            requester_signature TEXT NOT NULL,
            status TEXT NOT NULL,
            released_amount TEXT NOT NULL,
            refunded_amount TEXT NOT NULL,
            delivery_receipt_id TEXT,
            created_at TEXT NOT NULL,
            released_at TEXT
        )",
        [],
    )
    .context("create escrow_holds table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS delivery_receipts (
            receipt_id TEXT PRIMARY KEY,
            hold_id TEXT NOT NULL,
            capsule_hash_digest TEXT NOT NULL,
            transfer_proof TEXT,
            requester_ack INTEGER NOT NULL,
            submitted_at TEXT NOT NULL,
            status TEXT NOT NULL
        )",
        [],
    )
    .context("create delivery_receipts table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS disputes (
            dispute_id TEXT PRIMARY KEY,
            hold_id TEXT NOT NULL,
            initiator TEXT NOT NULL,
            reason TEXT NOT NULL,
            evidence_hashes TEXT NOT NULL,
            status TEXT NOT NULL,
            opened_at TEXT NOT NULL,
            resolution TEXT,
            release_amount TEXT,
            refund_amount TEXT
        )",
        [],
    )
    .context("create disputes table")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_disputes_hold ON disputes(hold_id)",
        [],
    )?;

    Ok(())
}

fn hold_status_str(s: HoldStatus) -> &'static str {
    match s {
        HoldStatus::PendingDelivery => "PENDING_DELIVERY",
        HoldStatus::DeliveryReceived => "DELIVERY_RECEIVED",
        HoldStatus::Verified => "VERIFIED",
        HoldStatus::Released => "RELEASED",
        HoldStatus::PartiallyReleased => "PARTIALLY_RELEASED",
        HoldStatus::Refunded => "REFUNDED",
        HoldStatus::Disputed => "DISPUTED",
    }
}

fn hold_status_from_str(s: &str) -> HoldStatus {
    match s {
        "DELIVERY_RECEIVED" => HoldStatus::DeliveryReceived,
        "VERIFIED" => HoldStatus::Verified,
        "RELEASED" => HoldStatus::Released,
        "PARTIALLY_RELEASED" => HoldStatus::PartiallyReleased,
        "REFUNDED" => HoldStatus::Refunded,
        "DISPUTED" => HoldStatus::Disputed,
        _ => HoldStatus::PendingDelivery,
    }
}

fn row_to_hold(row: &rusqlite::Row) -> rusqlite::Result<EscrowHold> {
    let amount: String = row.get("amount")?;
    let released_amount: String = row.get("released_amount")?;
    let refunded_amount: String = row.get("refunded_amount")?;
    let status: String = row.get("status")?;
    let delivery_receipt_id: Option<String> = row.get("delivery_receipt_id")?;
    let released_at: Option<DateTime<Utc>> = row.get("released_at")?;
    let hold_id: String = row.get("hold_id")?;
    let request_id: String = row.get("request_id")?;
    Ok(EscrowHold {
        hold_id: Uuid::parse_str(&hold_id).unwrap_or_default(),
        contract_id: row.get("contract_id")?,
        request_id: Uuid::parse_str(&request_id).unwrap_or_default(),
        requester_id: row.get("requester_id")?,
        ds_id: row.get("ds_id")?,
        amount: amount.parse().unwrap_or_default(),
        contract_hash_digest: row.get("contract_hash_digest")?,
        ds_signature: row.get("ds_signature")?,
        requester_signature: row.get("requester_signature")?,
        status: hold_status_from_str(&status),
        released_amount: released_amount.parse().unwrap_or_default(),
        refunded_amount: refunded_amount.parse().unwrap_or_default(),
        delivery_receipt_id: delivery_receipt_id.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: row.get("created_at")?,
        released_at,
    })
}

impl Store {
    pub async fn insert_hold(&self, hold: &EscrowHold) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO escrow_holds (hold_id, contract_id, request_id, requester_id, ds_id,
                amount, contract_hash_digest, ds_signature, requester_signature, status,
                released_amount, refunded_amount, delivery_receipt_id, created_at, released_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                hold.hold_id.to_string(),
                hold.contract_id,
                hold.request_id.to_string(),
                hold.requester_id,
                hold.ds_id,
                hold.amount.to_string(),
                hold.contract_hash_digest,
                hold.ds_signature,
                hold.requester_signature,
                hold_status_str(hold.status),
                hold.released_amount.to_string(),
                hold.refunded_amount.to_string(),
                hold.delivery_receipt_id.map(|id| id.to_string()),
                hold.created_at.to_rfc3339(),
                hold.released_at.map(|d| d.to_rfc3339()),
            ],
        )
        .context("insert escrow hold")?;
        Ok(())
    }

    pub async fn get_hold(&self, hold_id: Uuid) -> Result<Option<EscrowHold>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM escrow_holds WHERE hold_id = ?1",
            params![hold_id.to_string()],
            row_to_hold,
        )
        .optional()
        .context("get escrow hold")
    }

    pub async fn update_hold(&self, hold: &EscrowHold) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE escrow_holds SET status = ?1, released_amount = ?2, refunded_amount = ?3,
                delivery_receipt_id = ?4, released_at = ?5 WHERE hold_id = ?6",
            params![
                hold_status_str(hold.status),
                hold.released_amount.to_string(),
                hold.refunded_amount.to_string(),
                hold.delivery_receipt_id.map(|id| id.to_string()),
                hold.released_at.map(|d| d.to_rfc3339()),
                hold.hold_id.to_string(),
            ],
        )
        .context("update escrow hold")?;
        Ok(())
    }

    pub async fn insert_delivery_receipt(&self, receipt: &DeliveryReceipt) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO delivery_receipts (receipt_id, hold_id, capsule_hash_digest,
                transfer_proof, requester_ack, submitted_at, status)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                receipt.receipt_id.to_string(),
                receipt.hold_id.to_string(),
                receipt.capsule_hash_digest,
                receipt.transfer_proof,
                receipt.requester_ack as i64,
                receipt.submitted_at.to_rfc3339(),
                delivery_status_str(receipt.status),
            ],
        )
        .context("insert delivery receipt")?;
        Ok(())
    }

    pub async fn update_delivery_receipt_status(&self, receipt_id: Uuid, status: DeliveryStatus) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE delivery_receipts SET status = ?1 WHERE receipt_id = ?2",
            params![delivery_status_str(status), receipt_id.to_string()],
        )
        .context("update delivery receipt status")?;
        Ok(())
    }

    pub async fn get_delivery_receipt(&self, receipt_id: Uuid) -> Result<Option<DeliveryReceipt>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM delivery_receipts WHERE receipt_id = ?1",
            params![receipt_id.to_string()],
            row_to_receipt,
        )
        .optional()
        .context("get delivery receipt")
    }

    pub async fn insert_dispute(&self, dispute: &Dispute) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO disputes (dispute_id, hold_id, initiator, reason, evidence_hashes,
                status, opened_at, resolution, release_amount, refund_amount)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                dispute.dispute_id.to_string(),
                dispute.hold_id.to_string(),
                initiator_str(dispute.initiator),
                dispute.reason,
                serde_json::to_string(&dispute.evidence_hashes)?,
                dispute_status_str(dispute.status),
                dispute.opened_at.to_rfc3339(),
                dispute.resolution,
                dispute.release_amount.map(|a| a.to_string()),
                dispute.refund_amount.map(|a| a.to_string()),
            ],
        )
        .context("insert dispute")?;
        Ok(())
    }

    pub async fn update_dispute(&self, dispute: &Dispute) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE disputes SET status = ?1, resolution = ?2, release_amount = ?3,
                refund_amount = ?4 WHERE dispute_id = ?5",
            params![
                dispute_status_str(dispute.status),
                dispute.resolution,
                dispute.release_amount.map(|a| a.to_string()),
                dispute.refund_amount.map(|a| a.to_string()),
                dispute.dispute_id.to_string(),
            ],
        )
        .context("update dispute")?;
        Ok(())
    }

    pub async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM disputes WHERE dispute_id = ?1",
            params![dispute_id.to_string()],
            row_to_dispute,
        )
        .optional()
        .context("get dispute")
    }

    pub async fn open_dispute_for_hold(&self, hold_id: Uuid) -> Result<Option<Dispute>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM disputes WHERE hold_id = ?1 AND status = 'OPEN'",
            params![hold_id.to_string()],
            row_to_dispute,
        )
        .optional()
        .context("get open dispute for hold")
    }
}

fn delivery_status_str(s: DeliveryStatus) -> &'static str {
    match s {
        DeliveryStatus::PendingVerification => "PENDING_VERIFICATION",
        DeliveryStatus::Verified => "VERIFIED",
        DeliveryStatus::VerificationFailed => "VERIFICATION_FAILED",
    }
}

fn delivery_status_from_str(s: &str) -> DeliveryStatus {
    match s {
        "VERIFIED" => DeliveryStatus::Verified,
        "VERIFICATION_FAILED" => DeliveryStatus::VerificationFailed,
        _ => DeliveryStatus::PendingVerification,
    }
}

fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<DeliveryReceipt> {
    let status: String = row.get("status")?;
    let receipt_id: String = row.get("receipt_id")?;
    let hold_id: String = row.get("hold_id")?;
    Ok(DeliveryReceipt {
        receipt_id: Uuid::parse_str(&receipt_id).unwrap_or_default(),
        hold_id: Uuid::parse_str(&hold_id).unwrap_or_default(),
        capsule_hash_digest: row.get("capsule_hash_digest")?,
        transfer_proof: row.get("transfer_proof")?,
        requester_ack: row.get::<_, i64>("requester_ack")? != 0,
        submitted_at: row.get("submitted_at")?,
        status: delivery_status_from_str(&status),
    })
}

fn initiator_str(i: DisputeInitiator) -> &'static str {
    match i {
        DisputeInitiator::Requester => "requester",
        DisputeInitiator::Ds => "ds",
    }
}

fn initiator_from_str(s: &str) -> DisputeInitiator {
    match s {
        "ds" => DisputeInitiator::Ds,
        _ => DisputeInitiator::Requester,
    }
}

fn dispute_status_str(s: DisputeStatus) -> &'static str {
    match s {
        DisputeStatus::Open => "OPEN",
        DisputeStatus::Resolved => "RESOLVED",
    }
}

fn dispute_status_from_str(s: &str) -> DisputeStatus {
    match s {
        "RESOLVED" => DisputeStatus::Resolved,
        _ => DisputeStatus::Open,
    }
}

fn row_to_dispute(row: &rusqlite::Row) -> rusqlite::Result<Dispute> {
    let evidence_json: String = row.get("evidence_hashes")?;
    let initiator: String = row.get("initiator")?;
    let status: String = row.get("status")?;
    let release_amount: Option<String> = row.get("release_amount")?;
    let refund_amount: Option<String> = row.get("refund_amount")?;
    let dispute_id: String = row.get("dispute_id")?;
    let hold_id: String = row.get("hold_id")?;
    Ok(Dispute {
        dispute_id: Uuid::parse_str(&dispute_id).unwrap_or_default(),
        hold_id: Uuid::parse_str(&hold_id).unwrap_or_default(),
        initiator: initiator_from_str(&initiator),
        reason: row.get("reason")?,
        evidence_hashes: serde_json::from_str(&evidence_json).unwrap_or_default(),
        status: dispute_status_from_str(&status),
        opened_at: row.get("opened_at")?,
        resolution: row.get("resolution")?,
        release_amount: release_amount.and_then(|s| s.parse().ok()),
        refund_amount: refund_amount.and_then(|s| s.parse().ok()),
    })
}
