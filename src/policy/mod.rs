//! C2 (signing) + C4 (review) — policy stamps and the rule engine that
//! produces them.

mod review;
pub mod signer;

pub use review::{review_request, PolicyReviewResult};
pub use signer::PolicyStampSigner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyDecision {
    Approved,
    Rejected,
    ManualReview,
}

impl PolicyDecision {
    pub fn as_wire(&self) -> &'static str {
        match self {
            PolicyDecision::Approved => "APPROVED",
            PolicyDecision::Rejected => "REJECTED",
            PolicyDecision::ManualReview => "MANUAL_REVIEW",
        }
    }
}

/// `{request_id, decision, safeguards, policy_version, timestamp,
/// signature, stamp_hash}` — immutable once signed (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStamp {
    pub request_id: Uuid,
    pub decision: PolicyDecision,
    pub safeguards: Vec<String>,
    pub policy_version: String,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub stamp_hash: String,
}
