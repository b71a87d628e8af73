//! Persistence layer for the durable tables named in spec §6: Request,
//! EscrowHold, DeliveryReceipt, DisputeRecord, AuditReceipt,
//! CanonicalEvent, Reputation, PolicyStamp.
//!
//! Grounded on `vault/vault_db.rs`: a single `rusqlite::Connection` behind
//! an async mutex, opened with WAL + NORMAL synchronous pragmas,
//! schema-on-open `CREATE TABLE IF NOT EXISTS`.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

mod audit_rows;
mod escrow_rows;
mod event_rows;
mod policy_rows;
mod reputation_rows;
mod request_rows;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).context("open coordinator db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        request_rows::create_tables(&conn)?;
        escrow_rows::create_tables(&conn)?;
        audit_rows::create_tables(&conn)?;
        event_rows::create_tables(&conn)?;
        reputation_rows::create_tables(&conn)?;
        policy_rows::create_tables(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory coordinator db")?;
        request_rows::create_tables(&conn)?;
        escrow_rows::create_tables(&conn)?;
        audit_rows::create_tables(&conn)?;
        event_rows::create_tables(&conn)?;
        reputation_rows::create_tables(&conn)?;
        policy_rows::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn conn(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
