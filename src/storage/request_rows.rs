use crate::model::{Request, RequestId, RequestStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS requests (
            request_id TEXT PRIMARY KEY,
            requester_id TEXT NOT NULL,
            purpose TEXT NOT NULL,
            scope TEXT NOT NULL,
            criteria TEXT NOT NULL,
            duration_start TEXT NOT NULL,
            duration_end TEXT NOT NULL,
            unit_price TEXT NOT NULL,
            participant_cap INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("create requests table")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_requests_requester ON requests(requester_id)",
        [],
    )?;
    Ok(())
}

fn status_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Draft => "DRAFT",
        RequestStatus::Screening => "SCREENING",
        RequestStatus::Active => "ACTIVE",
        RequestStatus::Rejected => "REJECTED",
        RequestStatus::Completed => "COMPLETED",
    }
}

fn status_from_str(s: &str) -> RequestStatus {
    match s {
        "SCREENING" => RequestStatus::Screening,
        "ACTIVE" => RequestStatus::Active,
        "REJECTED" => RequestStatus::Rejected,
        "COMPLETED" => RequestStatus::Completed,
        _ => RequestStatus::Draft,
    }
}

fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<Request> {
    let scope_json: String = row.get("scope")?;
    let criteria_json: String = row.get("criteria")?;
    let unit_price: String = row.get("unit_price")?;
    let status: String = row.get("status")?;
    let request_id: String = row.get("request_id")?;
    Ok(Request {
        request_id: Uuid::parse_str(&request_id).unwrap_or_default(),
        requester_id: row.get("requester_id")?,
        purpose: row.get("purpose")?,
        scope: serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&scope_json)
            .unwrap_or_default(),
        criteria: serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&criteria_json)
            .unwrap_or_default(),
        duration_start: row.get::<_, DateTime<Utc>>("duration_start")?,
        duration_end: row.get::<_, DateTime<Utc>>("duration_end")?,
        unit_price: unit_price.parse().unwrap_or_default(),
        participant_cap: row.get::<_, i64>("participant_cap")? as u32,
        status: status_from_str(&status),
        created_at: row.get::<_, DateTime<Utc>>("created_at")?,
    })
}

impl Store {
    pub async fn insert_request(&self, request: &Request) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO requests (request_id, requester_id, purpose, scope, criteria,
                duration_start, duration_end, unit_price, participant_cap, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                request.request_id.to_string(),
                request.requester_id,
                request.purpose,
                serde_json::to_string(&request.scope)?,
                serde_json::to_string(&request.criteria)?,
                request.duration_start.to_rfc3339(),
                request.duration_end.to_rfc3339(),
                request.unit_price.to_string(),
                request.participant_cap,
                status_str(request.status),
                request.created_at.to_rfc3339(),
            ],
        )
        .context("insert request")?;
        Ok(())
    }

    pub async fn get_request(&self, id: RequestId) -> Result<Option<Request>> {
        let conn = self.conn().await;
        let request = conn
            .query_row(
                "SELECT * FROM requests WHERE request_id = ?1",
                params![id.to_string()],
                row_to_request,
            )
            .optional()
            .context("get request")?;
        Ok(request)
    }

    pub async fn set_request_status(&self, id: RequestId, status: RequestStatus) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE requests SET status = ?1 WHERE request_id = ?2",
            params![status_str(status), id.to_string()],
        )
        .context("update request status")?;
        Ok(())
    }
}
