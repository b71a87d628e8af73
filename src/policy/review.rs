//! C4 — Policy Review rule engine (spec §4.4).

use crate::model::{Request, ODX_CRITERIA_KEYS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PolicyDecision;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyReviewResult {
    pub decision: PolicyDecision,
    pub safeguards: Vec<String>,
    pub reason_codes: Vec<String>,
    pub remediation_hints: Vec<String>,
}

/// Whether `scope` or `criteria` signal the named domain, either via the
/// `domain.<name>` prefix key form or a bare `domain` key whose value
/// names it — both forms are legal under spec §6's `domain.*` label
/// space.
fn touches_domain(request: &Request, name: &str) -> bool {
    let prefixed = format!("domain.{name}");
    let check = |map: &std::collections::BTreeMap<String, Value>| -> bool {
        if map.contains_key(&prefixed) {
            return true;
        }
        match map.get("domain") {
            Some(Value::String(s)) => s == name,
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(name)),
            _ => false,
        }
    };
    check(&request.scope) || check(&request.criteria)
}

fn mentions_minors(purpose: &str) -> bool {
    let lower = purpose.to_lowercase();
    ["minor", "minors", "child", "children", "kid", "kids", "under 18", "underage"]
        .iter()
        .any(|term| lower.contains(term))
}

/// `review_request(request) -> PolicyReviewResult` (spec §4.4). Rules are
/// applied in order; each contributes safeguards and reason codes.
pub fn review_request(request: &Request) -> PolicyReviewResult {
    let mut safeguards: Vec<String> = vec!["K_ANONYMITY_50".to_string(), "TTL_72H".to_string()];
    let mut reason_codes: Vec<String> = Vec::new();
    let mut remediation_hints: Vec<String> = Vec::new();
    let mut decision = PolicyDecision::Approved;

    let health = touches_domain(request, "health");
    let location = touches_domain(request, "location");
    let finance = touches_domain(request, "finance");

    if health {
        safeguards.push("CLEAN_ROOM_ONLY".to_string());
        safeguards.push("PRIVACY_FLOOR_HIGH".to_string());
    }
    if location {
        safeguards.push("COARSE_GEO".to_string());
    }
    if health && location {
        if !safeguards.iter().any(|s| s == "CLEAN_ROOM_ONLY") {
            safeguards.push("CLEAN_ROOM_ONLY".to_string());
        }
        reason_codes.push("HEALTH_AND_LOCATION_COMBINED".to_string());
    }
    if finance && location {
        let has_mitigation = safeguards.iter().any(|s| s == "CLEAN_ROOM_ONLY" || s == "AGGREGATE_ONLY");
        if !has_mitigation {
            safeguards.push("AGGREGATE_ONLY".to_string());
        }
        reason_codes.push("FINANCE_AND_LOCATION_COMBINED".to_string());
    }

    if mentions_minors(&request.purpose) {
        decision = PolicyDecision::ManualReview;
        reason_codes.push("MINORS_INVOLVEMENT_DETECTED".to_string());
    }

    let criteria_count = request.criteria.len();
    if criteria_count > 8 {
        reason_codes.push("CRITERIA_TOO_SPECIFIC".to_string());
        remediation_hints.push(format!(
            "narrow eligibility criteria to at most 8 fields (found {criteria_count})"
        ));
    }

    let non_odx: Vec<&String> = request
        .criteria
        .keys()
        .filter(|k| !ODX_CRITERIA_KEYS.contains(&k.as_str()))
        .collect();
    if !non_odx.is_empty() {
        reason_codes.push("NON_ODX_CRITERIA".to_string());
        remediation_hints.push(format!(
            "criteria keys must be ODX-allowed ({}) or use the domain.* prefix form",
            ODX_CRITERIA_KEYS.join(", ")
        ));
    }

    safeguards.sort();
    safeguards.dedup();

    PolicyReviewResult {
        decision,
        safeguards,
        reason_codes,
        remediation_hints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Request, RequestStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn base_request() -> Request {
        Request {
            request_id: Uuid::new_v4(),
            requester_id: "req-1".to_string(),
            purpose: "market research".to_string(),
            scope: BTreeMap::new(),
            criteria: BTreeMap::new(),
            duration_start: Utc::now(),
            duration_end: Utc::now() + chrono::Duration::days(1),
            unit_price: Decimal::new(100, 2),
            participant_cap: 10,
            status: RequestStatus::Screening,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn baseline_safeguards_always_present() {
        let result = review_request(&base_request());
        assert!(result.safeguards.contains(&"K_ANONYMITY_50".to_string()));
        assert!(result.safeguards.contains(&"TTL_72H".to_string()));
        assert_eq!(result.decision, PolicyDecision::Approved);
    }

    #[test]
    fn health_and_location_forces_clean_room() {
        let mut request = base_request();
        request.scope.insert("domain.health".to_string(), Value::String("x".to_string()));
        request.scope.insert("domain.location".to_string(), Value::String("y".to_string()));
        let result = review_request(&request);
        assert!(result.safeguards.contains(&"CLEAN_ROOM_ONLY".to_string()));
        assert!(result.reason_codes.iter().any(|c| c.contains("HEALTH") || c.contains("LOCATION")));
    }

    #[test]
    fn finance_and_location_requires_mitigation() {
        let mut request = base_request();
        request.scope.insert("domain.finance".to_string(), Value::String("x".to_string()));
        request.scope.insert("domain.location".to_string(), Value::String("y".to_string()));
        let result = review_request(&request);
        assert!(result
            .safeguards
            .iter()
            .any(|s| s == "CLEAN_ROOM_ONLY" || s == "AGGREGATE_ONLY"));
    }

    #[test]
    fn minors_purpose_forces_manual_review() {
        let mut request = base_request();
        request.purpose = "profile children's shopping habits".to_string();
        let result = review_request(&request);
        assert_eq!(result.decision, PolicyDecision::ManualReview);
        assert!(result.reason_codes.contains(&"MINORS_INVOLVEMENT_DETECTED".to_string()));
    }

    #[test]
    fn too_many_criteria_fields_flagged() {
        let mut request = base_request();
        for key in ODX_CRITERIA_KEYS.iter() {
            request.criteria.insert(key.to_string(), Value::String("x".to_string()));
        }
        let result = review_request(&request);
        assert!(result.reason_codes.contains(&"CRITERIA_TOO_SPECIFIC".to_string()));
        assert!(result.remediation_hints.iter().any(|h| h.contains('8')));
    }

    #[test]
    fn non_odx_criteria_flagged() {
        let mut request = base_request();
        request.criteria.insert("favorite_color".to_string(), Value::String("blue".to_string()));
        let result = review_request(&request);
        assert!(result.reason_codes.contains(&"NON_ODX_CRITERIA".to_string()));
        assert!(result.remediation_hints.iter().any(|h| h.contains("ODX-allowed") && h.contains("domain.*")));
    }
}
