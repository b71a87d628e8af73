use crate::policy::{PolicyDecision, PolicyStamp};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS policy_stamps (
            request_id TEXT PRIMARY KEY,
            decision TEXT NOT NULL,
            safeguards TEXT NOT NULL,
            policy_version TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            signature TEXT NOT NULL,
            stamp_hash TEXT NOT NULL
        )",
        [],
    )
    .context("create policy_stamps table")?;
    Ok(())
}

fn decision_str(d: PolicyDecision) -> &'static str {
    match d {
        PolicyDecision::Approved => "APPROVED",
        PolicyDecision::Rejected => "REJECTED",
        PolicyDecision::ManualReview => "MANUAL_REVIEW",
    }
}

fn decision_from_str(s: &str) -> PolicyDecision {
    match s {
        "REJECTED" => PolicyDecision::Rejected,
        "MANUAL_REVIEW" => PolicyDecision::ManualReview,
        _ => PolicyDecision::Approved,
    }
}

fn row_to_stamp(row: &rusqlite::Row) -> rusqlite::Result<PolicyStamp> {
    let decision: String = row.get("decision")?;
    let safeguards_json: String = row.get("safeguards")?;
    let request_id: String = row.get("request_id")?;
    Ok(PolicyStamp {
        request_id: Uuid::parse_str(&request_id).unwrap_or_default(),
        decision: decision_from_str(&decision),
        safeguards: serde_json::from_str(&safeguards_json).unwrap_or_default(),
        policy_version: row.get("policy_version")?,
        timestamp: row.get("timestamp")?,
        signature: row.get("signature")?,
        stamp_hash: row.get("stamp_hash")?,
    })
}

impl Store {
    pub async fn insert_policy_stamp(&self, stamp: &PolicyStamp) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO policy_stamps (request_id, decision, safeguards, policy_version,
                timestamp, signature, stamp_hash)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                stamp.request_id.to_string(),
                decision_str(stamp.decision),
                serde_json::to_string(&stamp.safeguards)?,
                stamp.policy_version,
                stamp.timestamp.to_rfc3339(),
                stamp.signature,
                stamp.stamp_hash,
            ],
        )
        .context("insert policy stamp")?;
        Ok(())
    }

    pub async fn get_policy_stamp(&self, request_id: uuid::Uuid) -> Result<Option<PolicyStamp>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM policy_stamps WHERE request_id = ?1",
            params![request_id.to_string()],
            row_to_stamp,
        )
        .optional()
        .context("get policy stamp")
    }
}
