use crate::audit::{AuditEventType, AuditReceipt};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_receipts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            actor_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            details_hash TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            receipt_hash TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )
    .context("create audit_receipts table")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_receipts(actor_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_receipts(resource_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_type ON audit_receipts(event_type)",
        [],
    )?;
    Ok(())
}

fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<AuditReceipt> {
    let event_type: String = row.get("event_type")?;
    Ok(AuditReceipt {
        seq: row.get("seq")?,
        event_type: AuditEventType::from_wire(&event_type),
        actor_id: row.get("actor_id")?,
        actor_type: row.get("actor_type")?,
        resource_id: row.get("resource_id")?,
        resource_type: row.get("resource_type")?,
        details_hash: row.get("details_hash")?,
        prev_hash: row.get("prev_hash")?,
        receipt_hash: row.get("receipt_hash")?,
        timestamp: row.get("timestamp")?,
    })
}

impl Store {
    pub async fn append_audit_receipt(&self, receipt: &AuditReceipt) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO audit_receipts (event_type, actor_id, actor_type, resource_id,
                resource_type, details_hash, prev_hash, receipt_hash, timestamp)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                receipt.event_type.as_wire(),
                receipt.actor_id,
                receipt.actor_type,
                receipt.resource_id,
                receipt.resource_type,
                receipt.details_hash,
                receipt.prev_hash,
                receipt.receipt_hash,
                receipt.timestamp.to_rfc3339(),
            ],
        )
        .context("append audit receipt")?;
        Ok(())
    }

    /// The chain tail: the most recently appended receipt's hash, or the
    /// genesis hash if the log is empty.
    pub async fn audit_tail_hash(&self) -> Result<String> {
        let conn = self.conn().await;
        let hash: Option<String> = conn
            .query_row(
                "SELECT receipt_hash FROM audit_receipts ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(hash.unwrap_or_else(|| "0".repeat(64)))
    }

    pub async fn audit_by_actor(&self, actor_id: &str, limit: i64, offset: i64) -> Result<Vec<AuditReceipt>> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_receipts WHERE actor_id = ?1 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![actor_id, limit, offset], row_to_receipt)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("audit by actor")?;
        Ok(rows)
    }

    pub async fn audit_by_resource(&self, resource_id: &str, limit: i64, offset: i64) -> Result<Vec<AuditReceipt>> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_receipts WHERE resource_id = ?1 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![resource_id, limit, offset], row_to_receipt)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("audit by resource")?;
        Ok(rows)
    }

    pub async fn audit_by_type(&self, event_type: AuditEventType, limit: i64, offset: i64) -> Result<Vec<AuditReceipt>> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_receipts WHERE event_type = ?1 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![event_type.as_wire(), limit, offset], row_to_receipt)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("audit by type")?;
        Ok(rows)
    }

    /// Bulk export as a canonical byte stream for external verification.
    pub async fn audit_export_all(&self) -> Result<Vec<AuditReceipt>> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare("SELECT * FROM audit_receipts ORDER BY seq ASC")?;
        let rows = stmt
            .query_map([], row_to_receipt)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("audit export")?;
        Ok(rows)
    }
}
