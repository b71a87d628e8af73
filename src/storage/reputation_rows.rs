use crate::reputation::{Reputation, ReputationEvent};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::Store;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reputations (
            requester_id TEXT PRIMARY KEY,
            score REAL NOT NULL,
            last_updated TEXT NOT NULL,
            history TEXT NOT NULL
        )",
        [],
    )
    .context("create reputations table")?;
    Ok(())
}

fn row_to_reputation(row: &rusqlite::Row) -> rusqlite::Result<Reputation> {
    let history_json: String = row.get("history")?;
    Ok(Reputation {
        requester_id: row.get("requester_id")?,
        score: row.get("score")?,
        last_updated: row.get("last_updated")?,
        history: serde_json::from_str::<Vec<ReputationEvent>>(&history_json).unwrap_or_default(),
    })
}

impl Store {
    pub async fn get_reputation(&self, requester_id: &str) -> Result<Option<Reputation>> {
        let conn = self.conn().await;
        conn.query_row(
            "SELECT * FROM reputations WHERE requester_id = ?1",
            params![requester_id],
            row_to_reputation,
        )
        .optional()
        .context("get reputation")
    }

    pub async fn upsert_reputation(&self, reputation: &Reputation) -> Result<()> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO reputations (requester_id, score, last_updated, history)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(requester_id) DO UPDATE SET
                score = excluded.score,
                last_updated = excluded.last_updated,
                history = excluded.history",
            params![
                reputation.requester_id,
                reputation.score,
                reputation.last_updated.to_rfc3339(),
                serde_json::to_string(&reputation.history)?,
            ],
        )
        .context("upsert reputation")?;
        Ok(())
    }
}
