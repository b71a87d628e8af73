//! The raw-data guard: a visitor over the scope/criteria/metadata value
//! tree that returns a list of violations instead of short-circuiting on
//! the first one (the "deep nested map traversal" design note, spec §9).

use super::detectors::detect_raw_data_shape;
use crate::model::FORBIDDEN_FIELDS;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub code: String,
}

impl Violation {
    fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Converts camelCase to snake_case so `forbidden_key_matches` recognises
/// both `ssn` / `rawData` style camelCase twins named in spec §4.3. Runs
/// of uppercase letters (acronyms like `SSN`) are kept as one word instead
/// of being split letter by letter.
fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower_or_digit = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_numeric());
            let ends_acronym = i > 0
                && chars[i - 1].is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev_lower_or_digit || ends_acronym {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn forbidden_key_matches(key: &str) -> bool {
    let normalized = to_snake_case(key).to_lowercase();
    FORBIDDEN_FIELDS.contains(&normalized.as_str())
}

/// Recursively walk a context (scope/criteria/metadata) tree, collecting
/// every forbidden-field and raw-data-shape violation found at any depth.
pub fn scan_context(context: &str, map: &BTreeMap<String, Value>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (key, value) in map {
        walk(context, key, value, &mut violations);
    }
    violations
}

fn walk(context: &str, key: &str, value: &Value, out: &mut Vec<Violation>) {
    if forbidden_key_matches(key) {
        out.push(Violation::new(format!("RAW_DATA_FIELD:{context}.{key}")));
    }

    match value {
        Value::String(s) => {
            if let Some(shape) = detect_raw_data_shape(s) {
                out.push(Violation::new(shape.violation_code()));
            }
        }
        Value::Object(obj) => {
            for (child_key, child_value) in obj {
                walk(context, child_key, child_value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(context, key, item, out);
            }
        }
        _ => {}
    }
}

/// Build a sanitised copy with forbidden keys and raw-data-shaped values
/// dropped, per spec §4.3 step 4.
pub fn sanitise(map: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        if forbidden_key_matches(key) {
            continue;
        }
        if let Some(sanitised_value) = sanitise_value(value) {
            out.insert(key.clone(), sanitised_value);
        }
    }
    out
}

fn sanitise_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            if detect_raw_data_shape(s).is_some() {
                None
            } else {
                Some(value.clone())
            }
        }
        Value::Object(obj) => {
            let mut out = serde_json::Map::new();
            for (k, v) in obj {
                if forbidden_key_matches(k) {
                    continue;
                }
                if let Some(sv) = sanitise_value(v) {
                    out.insert(k.clone(), sv);
                }
            }
            Some(Value::Object(out))
        }
        Value::Array(items) => {
            let sanitised: Vec<Value> = items.iter().filter_map(sanitise_value).collect();
            Some(Value::Array(sanitised))
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_forbidden_field_case_insensitively_and_camel_case() {
        let mut map = BTreeMap::new();
        map.insert("SSN".to_string(), json!("123-45-6789"));
        map.insert("socialSecurity".to_string(), json!("x"));
        let violations = scan_context("scope", &map);
        assert!(violations.iter().any(|v| v.code.starts_with("RAW_DATA_FIELD:scope.SSN")));
        assert!(violations.iter().any(|v| v.code.starts_with("RAW_DATA_FIELD:scope.socialSecurity")));
    }

    #[test]
    fn flags_nested_forbidden_fields() {
        let mut map = BTreeMap::new();
        map.insert("nested".to_string(), json!({"gps_coordinates": "x"}));
        let violations = scan_context("scope", &map);
        assert!(violations.iter().any(|v| v.code.contains("gps_coordinates")));
    }

    #[test]
    fn flags_raw_data_shapes_in_values_at_any_depth() {
        let mut map = BTreeMap::new();
        map.insert("location".to_string(), json!("37.42158, -122.08427"));
        map.insert("nested".to_string(), json!({"notes": "123-45-6789"}));
        let violations = scan_context("scope", &map);
        assert!(violations.iter().any(|v| v.code == "RAW_GPS_DATA"));
        assert!(violations.iter().any(|v| v.code == "RAW_PII_DATA"));
    }

    #[test]
    fn sanitise_drops_forbidden_keys_and_raw_shaped_values() {
        let mut map = BTreeMap::new();
        map.insert("ssn".to_string(), json!("123-45-6789"));
        map.insert("domain".to_string(), json!("health"));
        map.insert("note".to_string(), json!("123-45-6789"));
        let clean = sanitise(&map);
        assert!(!clean.contains_key("ssn"));
        assert!(!clean.contains_key("note"));
        assert_eq!(clean.get("domain"), Some(&json!("health")));
    }
}
