//! Shared data model: the types components pass to each other.
//!
//! Scope/criteria are modeled as a `serde_json::Value` tree (the "deep
//! nested map" design note in spec §9) rather than a fixed struct, since
//! the ODX facet set and forbidden-field set are defined over arbitrary
//! string keys at arbitrary depth.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub type RequestId = Uuid;
pub type RequesterId = String;
pub type DsId = String;

/// Money is always scale-2 decimal; never a binary float (spec §6).
pub type Money = Decimal;

/// Round to the mandated scale-2 representation.
pub fn money_scale2(value: Decimal) -> Money {
    value.round_dp(2)
}

pub const ODX_CRITERIA_KEYS: &[&str] = &[
    "account_type",
    "status",
    "created_after",
    "created_before",
    "domain",
    "time_bucket",
    "geo_bucket",
    "quality_tier",
    "privacy_floor",
    "data_category",
    "availability_band",
];

pub const FORBIDDEN_FIELDS: &[&str] = &[
    "raw_data",
    "raw_payload",
    "health_data",
    "medical_records",
    "location_precise",
    "gps_coordinates",
    "private_labels",
    "personal_identifiers",
    "biometric_data",
    "genetic_data",
    "node_location",
    "device_location",
    "health_flags",
    "health_status",
    "ssn",
    "social_security",
    "passport_number",
    "credit_card",
    "bank_account",
    "password",
    "secret_key",
    "private_key",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Draft,
    Screening,
    Active,
    Rejected,
    Completed,
}

/// A submitted data request, owned exclusively by the lifecycle
/// coordinator (C8) and mutated only through state-machine transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub requester_id: RequesterId,
    pub purpose: String,
    pub scope: BTreeMap<String, Value>,
    pub criteria: BTreeMap<String, Value>,
    pub duration_start: DateTime<Utc>,
    pub duration_end: DateTime<Utc>,
    pub unit_price: Money,
    pub participant_cap: u32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn budget(&self) -> Money {
        money_scale2(self.unit_price * Decimal::from(self.participant_cap))
    }
}

/// Input accepted by `store_request` (C3), before an id is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestInput {
    pub requester_id: RequesterId,
    pub purpose: String,
    #[serde(default)]
    pub scope: BTreeMap<String, Value>,
    #[serde(default)]
    pub criteria: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub duration_start: DateTime<Utc>,
    pub duration_end: DateTime<Utc>,
    pub unit_price: Money,
    pub participant_cap: u32,
}

/// A sanitized projection of a `Request` distributed to nodes (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationPayload {
    pub request_id: RequestId,
    pub requester_id: RequesterId,
    pub purpose: String,
    pub scope: BTreeMap<String, Value>,
    pub criteria: BTreeMap<String, Value>,
    pub unit_price: Money,
    pub participant_cap: u32,
    pub duration_start: DateTime<Utc>,
    pub duration_end: DateTime<Utc>,
}
