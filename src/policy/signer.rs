//! C2 — Policy Stamp Signer.
//!
//! Deterministic HMAC-SHA256 MAC over the pipe-joined canonical tuple,
//! grounded on the teacher's own "HMAC signing for Polymarket CLOB API"
//! dependency pair (`hmac` + `sha2`) and `auth/jwt.rs`'s handler shape
//! (a struct holding the key, `sign`/`verify` methods, dedicated tamper
//! tests).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{PolicyDecision, PolicyStamp};

type HmacSha256 = Hmac<Sha256>;

/// Constant-time byte comparison: always walks the full shorter length so
/// timing does not leak how many leading bytes matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Holds the process-wide MAC key behind a read-only handle, per spec
/// §9's "cryptographic key handling" design note.
#[derive(Clone)]
pub struct PolicyStampSigner {
    key: [u8; 32],
}

impl PolicyStampSigner {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn canonical_payload(
        request_id: Uuid,
        decision: PolicyDecision,
        safeguards: &[String],
        policy_version: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        let mut sorted = safeguards.to_vec();
        sorted.sort();
        format!(
            "{}|{}|{}|{}|{}",
            request_id,
            decision.as_wire(),
            sorted.join(","),
            policy_version,
            timestamp.to_rfc3339(),
        )
    }

    fn mac(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign a policy decision, producing an immutable stamp.
    pub fn sign(
        &self,
        request_id: Uuid,
        decision: PolicyDecision,
        safeguards: Vec<String>,
        policy_version: String,
    ) -> PolicyStamp {
        let timestamp = Utc::now();
        let payload = Self::canonical_payload(request_id, decision, &safeguards, &policy_version, timestamp);
        let signature = self.mac(&payload);
        let stamp_hash = hex::encode(Sha256::digest(format!("{payload}|{signature}").as_bytes()));

        let mut safeguards = safeguards;
        safeguards.sort();

        PolicyStamp {
            request_id,
            decision,
            safeguards,
            policy_version,
            timestamp,
            signature,
            stamp_hash,
        }
    }

    /// Verification is total: it never panics and always returns a bool,
    /// using a constant-time comparison on the signature bytes.
    pub fn verify(&self, stamp: &PolicyStamp) -> bool {
        let payload = Self::canonical_payload(
            stamp.request_id,
            stamp.decision,
            &stamp.safeguards,
            &stamp.policy_version,
            stamp.timestamp,
        );
        let expected = self.mac(&payload);

        let sig_ok = match (hex::decode(&expected), hex::decode(&stamp.signature)) {
            (Ok(a), Ok(b)) => constant_time_eq(&a, &b),
            _ => false,
        };
        if !sig_ok {
            return false;
        }

        let expected_hash = hex::encode(Sha256::digest(format!("{payload}|{}", stamp.signature).as_bytes()));
        expected_hash == stamp.stamp_hash
    }

    /// Sign an arbitrary byte string (e.g. a Merkle root) with the raw
    /// HMAC, for signing purposes outside the policy-stamp payload shape.
    pub fn sign_raw(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verify a `sign_raw` signature in constant time. Total: never panics.
    pub fn verify_raw(&self, data: &[u8], signature: &[u8]) -> bool {
        let expected = self.sign_raw(data);
        constant_time_eq(&expected, signature)
    }

    /// Derive a distinct key for a different signing purpose (e.g. the
    /// rendezvous session token signer) from the same process secret,
    /// per spec §9's design note that key material should be process-
    /// scoped but distinct per purpose.
    pub fn derive_key(&self, purpose: &str) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(purpose.as_bytes());
        let bytes = mac.finalize().into_bytes();
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        key
    }
}
