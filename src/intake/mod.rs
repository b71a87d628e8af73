//! C3 — Request Intake & Raw-Data Guard (spec §4.3).

mod detectors;
mod guard;

pub use detectors::{detect_raw_data_shape, RawDataShape};
pub use guard::{sanitise, scan_context, Violation};

use crate::model::{RequestInput, ODX_CRITERIA_KEYS};
use std::collections::BTreeMap;

/// Outcome of `store_request`'s validation phases, before persistence.
#[derive(Debug)]
pub enum IntakeOutcome {
    /// Schema validation failed; nothing was touched.
    SchemaInvalid(Vec<String>),
    /// A forbidden field or raw-data shape was detected anywhere in
    /// scope/criteria/metadata; storage is rejected and the caller must
    /// write the `UNAUTHORIZED_FIELD_ACCESS_ATTEMPT` audit receipt and
    /// notify reputation (spec §4.3 step 3).
    RawDataRejected(Vec<String>),
    /// Validation passed; here is the sanitised scope/criteria ready to
    /// persist (spec §4.3 step 4).
    Accepted {
        scope: BTreeMap<String, serde_json::Value>,
        criteria: BTreeMap<String, serde_json::Value>,
    },
}

/// Phase 1 (schema validation). Pure and total: never panics, returns a
/// list of typed violation codes.
fn validate_schema(input: &RequestInput) -> Vec<String> {
    let mut codes = Vec::new();

    if input.requester_id.trim().is_empty() {
        codes.push("MISSING_REQUESTER_ID".to_string());
    }
    if input.purpose.trim().is_empty() {
        codes.push("MISSING_PURPOSE".to_string());
    }
    if input.scope.is_empty() {
        codes.push("MISSING_SCOPE".to_string());
    }
    if input.unit_price <= rust_decimal::Decimal::ZERO {
        codes.push("INVALID_UNIT_PRICE".to_string());
    }
    if input.participant_cap == 0 {
        codes.push("INVALID_PARTICIPANT_CAP".to_string());
    }
    if input.duration_start > input.duration_end {
        codes.push("INVALID_DURATION_WINDOW".to_string());
    }

    for key in input.criteria.keys() {
        if !ODX_CRITERIA_KEYS.contains(&key.as_str()) {
            codes.push(format!("INVALID_CRITERIA_FIELD:{key}"));
        }
    }

    codes
}

/// Phases 1–2 of `store_request`: schema validation then the raw-data
/// scan across scope, criteria and metadata.
pub fn evaluate(input: &RequestInput) -> IntakeOutcome {
    let schema_violations = validate_schema(input);
    if !schema_violations.is_empty() {
        return IntakeOutcome::SchemaInvalid(schema_violations);
    }

    let mut violations = Vec::new();
    violations.extend(scan_context("scope", &input.scope).into_iter().map(|v| v.code));
    violations.extend(scan_context("criteria", &input.criteria).into_iter().map(|v| v.code));
    violations.extend(scan_context("metadata", &input.metadata).into_iter().map(|v| v.code));

    if !violations.is_empty() {
        return IntakeOutcome::RawDataRejected(violations);
    }

    IntakeOutcome::Accepted {
        scope: sanitise(&input.scope),
        criteria: sanitise(&input.criteria),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn base_input() -> RequestInput {
        RequestInput {
            requester_id: "req-1".to_string(),
            purpose: "x".to_string(),
            scope: BTreeMap::from([("domain".to_string(), json!("location"))]),
            criteria: BTreeMap::new(),
            metadata: BTreeMap::new(),
            duration_start: Utc::now(),
            duration_end: Utc::now() + chrono::Duration::days(1),
            unit_price: Decimal::new(100, 2),
            participant_cap: 10,
        }
    }

    #[test]
    fn rejects_ssn_in_scope() {
        let mut input = base_input();
        input.scope.insert("ssn".to_string(), json!("123-45-6789"));
        match evaluate(&input) {
            IntakeOutcome::RawDataRejected(codes) => {
                assert!(codes.iter().any(|c| c.contains("ssn") || c == "RAW_PII_DATA"));
            }
            other => panic!("expected RawDataRejected, got {other:?}"),
        }
    }

    #[test]
    fn accepts_clean_request() {
        let input = base_input();
        match evaluate(&input) {
            IntakeOutcome::Accepted { scope, .. } => assert!(scope.contains_key("domain")),
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_purpose() {
        let mut input = base_input();
        input.purpose = "   ".to_string();
        match evaluate(&input) {
            IntakeOutcome::SchemaInvalid(codes) => assert!(codes.contains(&"MISSING_PURPOSE".to_string())),
            other => panic!("expected SchemaInvalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_odx_criteria_key_at_schema_stage() {
        let mut input = base_input();
        input.criteria.insert("favorite_color".to_string(), json!("blue"));
        match evaluate(&input) {
            IntakeOutcome::SchemaInvalid(codes) => {
                assert!(codes.iter().any(|c| c.starts_with("INVALID_CRITERIA_FIELD")))
            }
            other => panic!("expected SchemaInvalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_duration_window() {
        let mut input = base_input();
        input.duration_end = input.duration_start - chrono::Duration::days(1);
        match evaluate(&input) {
            IntakeOutcome::SchemaInvalid(codes) => {
                assert!(codes.contains(&"INVALID_DURATION_WINDOW".to_string()))
            }
            other => panic!("expected SchemaInvalid, got {other:?}"),
        }
    }
}
