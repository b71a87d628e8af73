//! Ephemeral rendezvous sessions and single-delivery ciphertext relay
//! (spec §4.6).

use super::entropy::looks_like_ciphertext;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_SESSION_TTL: chrono::Duration = chrono::Duration::minutes(15);
const MAX_RELAY_MESSAGE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousSession {
    pub session_id: String,
    pub ds_ephemeral_id: String,
    pub requester_ephemeral_id: String,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub relay_url: String,
    pub ice_servers: Vec<String>,
}

pub struct CreatedSession {
    pub session_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenValidation {
    pub valid: bool,
    pub session_id: Option<String>,
    pub status: Option<SessionStatus>,
}

struct RelayMessage {
    ciphertext: Vec<u8>,
    sender_ephemeral_id: String,
    expires_at: DateTime<Utc>,
}

fn random_session_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Signed, compact token bound to a session id and expiry: opaque
/// `session_id.expiry_unix.mac_hex`; never derived from peer ids.
fn sign_token(key: &[u8; 32], session_id: &str, expires_at: DateTime<Utc>) -> String {
    let payload = format!("{session_id}.{}", expires_at.timestamp());
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{payload}.{signature}")
}

fn verify_token(key: &[u8; 32], token: &str) -> Option<(String, i64)> {
    let mut parts = token.splitn(3, '.');
    let session_id = parts.next()?;
    let expiry_str = parts.next()?;
    let signature = parts.next()?;
    if session_id.is_empty() || expiry_str.is_empty() || signature.is_empty() {
        return None;
    }
    let expiry: i64 = expiry_str.parse().ok()?;
    let expected = sign_token(key, session_id, DateTime::from_timestamp(expiry, 0)?);
    if expected == token {
        Some((session_id.to_string(), expiry))
    } else {
        None
    }
}

pub struct RendezvousStore {
    signing_key: [u8; 32],
    sessions: Mutex<HashMap<String, RendezvousSession>>,
    messages: Mutex<HashMap<String, Vec<RelayMessage>>>,
}

impl RendezvousStore {
    pub fn new(signing_key: [u8; 32]) -> Self {
        Self {
            signing_key,
            sessions: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
        }
    }

    pub fn create_session(
        &self,
        ds_ephemeral_id: &str,
        requester_ephemeral_id: &str,
        ttl: chrono::Duration,
        relay_url: &str,
        ice_servers: Vec<String>,
    ) -> CreatedSession {
        let ttl = ttl.min(MAX_SESSION_TTL);
        let session_id = random_session_id();
        let expires_at = Utc::now() + ttl;

        let session = RendezvousSession {
            session_id: session_id.clone(),
            ds_ephemeral_id: ds_ephemeral_id.to_string(),
            requester_ephemeral_id: requester_ephemeral_id.to_string(),
            expires_at,
            status: SessionStatus::Pending,
            relay_url: relay_url.to_string(),
            ice_servers,
        };

        let token = sign_token(&self.signing_key, &session_id, expires_at);
        self.sessions.lock().insert(session_id.clone(), session);
        CreatedSession {
            session_id,
            token,
            expires_at,
        }
    }

    /// Rejects empty/malformed/expired tokens (spec §4.6).
    pub fn validate_token(&self, token: &str) -> TokenValidation {
        if token.trim().is_empty() {
            return TokenValidation {
                valid: false,
                session_id: None,
                status: None,
            };
        }
        let Some((session_id, expiry)) = verify_token(&self.signing_key, token) else {
            return TokenValidation {
                valid: false,
                session_id: None,
                status: None,
            };
        };
        if Utc::now().timestamp() > expiry {
            return TokenValidation {
                valid: false,
                session_id: Some(session_id),
                status: None,
            };
        }
        let sessions = self.sessions.lock();
        match sessions.get(&session_id) {
            Some(session) => TokenValidation {
                valid: true,
                session_id: Some(session_id),
                status: Some(session.status),
            },
            None => TokenValidation {
                valid: false,
                session_id: Some(session_id),
                status: None,
            },
        }
    }

    /// Requires a live (non-expired) session and ciphertext-shaped
    /// payload. Stores the message once; it's removed on first
    /// retrieval by the opposite peer (spec §4.6 exactly-once delivery).
    pub fn relay(
        &self,
        session_id: &str,
        ciphertext: Vec<u8>,
        sender_ephemeral_id: &str,
    ) -> Result<DateTime<Utc>, &'static str> {
        if ciphertext.len() > MAX_RELAY_MESSAGE_BYTES {
            return Err("message exceeds maximum relay size");
        }
        if !looks_like_ciphertext(&ciphertext) {
            return Err("payload does not resemble ciphertext");
        }

        let sessions = self.sessions.lock();
        let session = sessions.get(session_id).ok_or("no such session")?;
        if session.expires_at < Utc::now() {
            return Err("session expired");
        }
        if sender_ephemeral_id != session.ds_ephemeral_id && sender_ephemeral_id != session.requester_ephemeral_id {
            return Err("sender is not a session participant");
        }
        let expires_at = session.expires_at;
        drop(sessions);

        let mut messages = self.messages.lock();
        messages.entry(session_id.to_string()).or_default().push(RelayMessage {
            ciphertext,
            sender_ephemeral_id: sender_ephemeral_id.to_string(),
            expires_at,
        });
        Ok(expires_at)
    }

    /// Retrieval by a non-participant ephemeral id returns empty
    /// (spec §4.6). Exactly-once: the first matching message is removed.
    pub fn retrieve(&self, session_id: &str, receiver_ephemeral_id: &str) -> Option<Vec<u8>> {
        let sessions = self.sessions.lock();
        let session = sessions.get(session_id)?;
        let is_participant = receiver_ephemeral_id == session.ds_ephemeral_id
            || receiver_ephemeral_id == session.requester_ephemeral_id;
        drop(sessions);
        if !is_participant {
            return None;
        }

        let mut messages = self.messages.lock();
        let queue = messages.get_mut(session_id)?;
        let position = queue
            .iter()
            .position(|m| m.sender_ephemeral_id != receiver_ephemeral_id && m.expires_at >= Utc::now())?;
        Some(queue.remove(position).ciphertext)
    }

    pub fn close_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = SessionStatus::Closed;
        }
        drop(sessions);
        self.sessions.lock().remove(session_id);
        self.messages.lock().remove(session_id);
    }

    /// Periodic sweep: purge expired sessions and their messages
    /// (spec §4.6 "no persistent storage of session or relay content
    /// beyond TTL").
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.expires_at < now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        drop(sessions);

        let mut messages = self.messages.lock();
        for id in &expired {
            messages.remove(id);
        }
        messages.retain(|_, queue| {
            queue.retain(|m| m.expires_at >= now);
            !queue.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RendezvousStore {
        RendezvousStore::new([5u8; 32])
    }

    fn random_ciphertext() -> Vec<u8> {
        let mut bytes = vec![0u8; 2048];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    #[test]
    fn ttl_is_clamped_to_fifteen_minutes() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::hours(2), "wss://relay", vec![]);
        let ttl = created.expires_at - Utc::now();
        assert!(ttl <= MAX_SESSION_TTL + chrono::Duration::seconds(1));
    }

    #[test]
    fn session_id_does_not_contain_peer_ids() {
        let store = store();
        let created = store.create_session("ds-secret", "req-secret", chrono::Duration::minutes(5), "wss://relay", vec![]);
        assert!(!created.session_id.contains("ds-secret"));
        assert!(!created.session_id.contains("req-secret"));
    }

    #[test]
    fn token_roundtrip_validates() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::minutes(5), "wss://relay", vec![]);
        let result = store.validate_token(&created.token);
        assert!(result.valid);
        assert_eq!(result.session_id, Some(created.session_id));
    }

    #[test]
    fn malformed_or_empty_tokens_rejected() {
        let store = store();
        assert!(!store.validate_token("").valid);
        assert!(!store.validate_token("garbage").valid);
        assert!(!store.validate_token("a.b.c").valid);
    }

    #[test]
    fn relay_rejects_low_entropy_payload() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::minutes(5), "wss://relay", vec![]);
        let result = store.relay(&created.session_id, vec![b'A'; 256], "ds-1");
        assert!(result.is_err());
    }

    #[test]
    fn relay_accepts_high_entropy_and_delivers_exactly_once() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::minutes(5), "wss://relay", vec![]);
        store.relay(&created.session_id, random_ciphertext(), "ds-1").unwrap();

        let first = store.retrieve(&created.session_id, "req-1");
        assert!(first.is_some());
        let second = store.retrieve(&created.session_id, "req-1");
        assert!(second.is_none());
    }

    #[test]
    fn non_participant_retrieval_returns_empty() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::minutes(5), "wss://relay", vec![]);
        store.relay(&created.session_id, random_ciphertext(), "ds-1").unwrap();
        assert!(store.retrieve(&created.session_id, "intruder").is_none());
    }

    #[test]
    fn sweep_removes_expired_sessions() {
        let store = store();
        let created = store.create_session("ds-1", "req-1", chrono::Duration::minutes(5), "wss://relay", vec![]);
        {
            let mut sessions = store.sessions.lock();
            sessions.get_mut(&created.session_id).unwrap().expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
        store.sweep_expired();
        assert!(!store.validate_token(&created.token).valid || store.sessions.lock().is_empty());
    }
}
