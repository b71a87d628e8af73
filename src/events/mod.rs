//! C9 — Canonical Event Bus (spec §4.9).

use crate::storage::Store;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: Uuid,
    pub trace_id: Uuid,
    pub event_type: String,
    pub event_name: String,
    pub schema_version: String,
    pub idempotency_key: String,
    pub actor_id: String,
    pub actor_type: String,
    pub resource_id: String,
    pub resource_type: String,
    pub payload_hash: String,
    pub payload_summary: String,
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

/// Hash a payload so the stored event never carries raw field values,
/// only `payload_hash` + a short human summary (spec §4.9).
pub fn hash_payload(payload: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct EventBus {
    store: std::sync::Arc<Store>,
    max_retries: u32,
}

impl EventBus {
    pub fn new(store: std::sync::Arc<Store>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Emit a new event against `trace_id` so sibling events of one
    /// logical flow correlate (e.g. REQUEST_CREATED, ESCROW_LOCKED,
    /// ESCROW_RELEASED). Returns `false` without writing if
    /// `idempotency_key` is a duplicate within retention (spec §4.9).
    #[allow(clippy::too_many_arguments)]
    pub async fn emit(
        &self,
        trace_id: Uuid,
        event_type: &str,
        event_name: &str,
        idempotency_key: &str,
        actor_id: &str,
        actor_type: &str,
        resource_id: &str,
        resource_type: &str,
        payload: &serde_json::Value,
        payload_summary: &str,
    ) -> Result<bool> {
        let event = CanonicalEvent {
            event_id: Uuid::new_v4(),
            trace_id,
            event_type: event_type.to_string(),
            event_name: event_name.to_string(),
            schema_version: "1".to_string(),
            idempotency_key: idempotency_key.to_string(),
            actor_id: actor_id.to_string(),
            actor_type: actor_type.to_string(),
            resource_id: resource_id.to_string(),
            resource_type: resource_type.to_string(),
            payload_hash: hash_payload(payload),
            payload_summary: payload_summary.to_string(),
            timestamp: Utc::now(),
            status: EventStatus::Pending,
            retry_count: 0,
            error_message: None,
        };
        self.store.insert_event_if_new(&event).await
    }

    /// Advance an event's lifecycle: PENDING -> PROCESSING is the
    /// dispatcher claiming it; on success it completes; on failure it
    /// either retries (bounded by `max_retries`) or falls to DEAD_LETTER.
    pub async fn mark_processing(&self, event_id: Uuid) -> Result<()> {
        self.store
            .update_event_status(event_id, EventStatus::Processing, 0, None)
            .await
    }

    pub async fn mark_completed(&self, event_id: Uuid) -> Result<()> {
        self.store
            .update_event_status(event_id, EventStatus::Completed, 0, None)
            .await
    }

    /// Record a failed processing attempt. Moves to DEAD_LETTER once
    /// `retry_count` would exceed `max_retries`.
    pub async fn mark_failed(
        &self,
        event_id: Uuid,
        current_retry_count: u32,
        error: &str,
    ) -> Result<EventStatus> {
        let next_retry_count = current_retry_count + 1;
        let status = if next_retry_count > self.max_retries {
            EventStatus::DeadLetter
        } else {
            EventStatus::Failed
        };
        self.store
            .update_event_status(event_id, status, next_retry_count, Some(error.to_string()))
            .await?;
        Ok(status)
    }

    pub async fn events_for_trace(&self, trace_id: Uuid) -> Result<Vec<CanonicalEvent>> {
        self.store.events_by_trace(trace_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use std::sync::Arc;

    #[tokio::test]
    async fn duplicate_idempotency_key_is_dropped() {
        let store = Arc::new(Store::in_memory().unwrap());
        let bus = EventBus::new(store);
        let trace = Uuid::new_v4();
        let payload = serde_json::json!({"x": 1});

        let first = bus
            .emit(trace, "REQUEST_CREATED", "request created", "key-1", "req-1", "requester", "req-id", "request", &payload, "created")
            .await
            .unwrap();
        let second = bus
            .emit(trace, "REQUEST_CREATED", "request created", "key-1", "req-1", "requester", "req-id", "request", &payload, "created")
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn sibling_events_share_trace_id() {
        let store = Arc::new(Store::in_memory().unwrap());
        let bus = EventBus::new(store);
        let trace = Uuid::new_v4();
        let payload = serde_json::json!({});

        bus.emit(trace, "REQUEST_CREATED", "x", "k1", "a", "requester", "r1", "request", &payload, "x").await.unwrap();
        bus.emit(trace, "ESCROW_LOCKED", "x", "k2", "a", "requester", "r1", "request", &payload, "x").await.unwrap();

        let events = bus.events_for_trace(trace).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_move_to_dead_letter() {
        let store = Arc::new(Store::in_memory().unwrap());
        let bus = EventBus::new(store);
        let trace = Uuid::new_v4();
        let payload = serde_json::json!({});
        bus.emit(trace, "X", "x", "k1", "a", "requester", "r1", "request", &payload, "x").await.unwrap();
        let events = bus.events_for_trace(trace).await.unwrap();
        let event_id = events[0].event_id;

        let mut status = EventStatus::Pending;
        for attempt in 0..(DEFAULT_MAX_RETRIES + 1) {
            status = bus.mark_failed(event_id, attempt, "boom").await.unwrap();
        }
        assert_eq!(status, EventStatus::DeadLetter);
    }
}
