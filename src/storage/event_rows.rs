use crate::events::{CanonicalEvent, EventStatus};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS canonical_events (
            event_id TEXT PRIMARY KEY,
            trace_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            event_name TEXT NOT NULL,
            schema_version TEXT NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            actor_id TEXT NOT NULL,
            actor_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            payload_summary TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status TEXT NOT NULL,
            retry_count INTEGER NOT NULL,
            error_message TEXT
        )",
        [],
    )
    .context("create canonical_events table")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_trace ON canonical_events(trace_id)",
        [],
    )?;
    Ok(())
}

fn status_str(s: EventStatus) -> &'static str {
    match s {
        EventStatus::Pending => "PENDING",
        EventStatus::Processing => "PROCESSING",
        EventStatus::Completed => "COMPLETED",
        EventStatus::Failed => "FAILED",
        EventStatus::DeadLetter => "DEAD_LETTER",
    }
}

fn status_from_str(s: &str) -> EventStatus {
    match s {
        "PROCESSING" => EventStatus::Processing,
        "COMPLETED" => EventStatus::Completed,
        "FAILED" => EventStatus::Failed,
        "DEAD_LETTER" => EventStatus::DeadLetter,
        _ => EventStatus::Pending,
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<CanonicalEvent> {
    let status: String = row.get("status")?;
    let event_id: String = row.get("event_id")?;
    let trace_id: String = row.get("trace_id")?;
    Ok(CanonicalEvent {
        event_id: Uuid::parse_str(&event_id).unwrap_or_default(),
        trace_id: Uuid::parse_str(&trace_id).unwrap_or_default(),
        event_type: row.get("event_type")?,
        event_name: row.get("event_name")?,
        schema_version: row.get("schema_version")?,
        idempotency_key: row.get("idempotency_key")?,
        actor_id: row.get("actor_id")?,
        actor_type: row.get("actor_type")?,
        resource_id: row.get("resource_id")?,
        resource_type: row.get("resource_type")?,
        payload_hash: row.get("payload_hash")?,
        payload_summary: row.get("payload_summary")?,
        timestamp: row.get("timestamp")?,
        status: status_from_str(&status),
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        error_message: row.get("error_message")?,
    })
}

impl Store {
    /// Returns `Ok(false)` without inserting if the idempotency key is a
    /// duplicate, per spec §4.9 ("duplicates within retention dropped at
    /// the bus").
    pub async fn insert_event_if_new(&self, event: &CanonicalEvent) -> Result<bool> {
        let conn = self.conn().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM canonical_events WHERE idempotency_key = ?1",
                params![event.idempotency_key],
                |row| row.get(0),
            )
            .optional()
            .context("check idempotency key")?;
        if exists.is_some() {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO canonical_events (event_id, trace_id, event_type, event_name,
                schema_version, idempotency_key, actor_id, actor_type, resource_id, resource_type,
                payload_hash, payload_summary, timestamp, status, retry_count, error_message)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                event.event_id.to_string(),
                event.trace_id.to_string(),
                event.event_type,
                event.event_name,
                event.schema_version,
                event.idempotency_key,
                event.actor_id,
                event.actor_type,
                event.resource_id,
                event.resource_type,
                event.payload_hash,
                event.payload_summary,
                event.timestamp.to_rfc3339(),
                status_str(event.status),
                event.retry_count,
                event.error_message,
            ],
        )
        .context("insert canonical event")?;
        Ok(true)
    }

    pub async fn update_event_status(
        &self,
        event_id: Uuid,
        status: EventStatus,
        retry_count: u32,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE canonical_events SET status = ?1, retry_count = ?2, error_message = ?3
             WHERE event_id = ?4",
            params![
                status_str(status),
                retry_count,
                error_message,
                event_id.to_string(),
            ],
        )
        .context("update canonical event status")?;
        Ok(())
    }

    pub async fn events_by_trace(&self, trace_id: Uuid) -> Result<Vec<CanonicalEvent>> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM canonical_events WHERE trace_id = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![trace_id.to_string()], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("events by trace")?;
        Ok(rows)
    }
}
