//! The three raw-data shape detectors, exact per spec §4.3/§6.

use regex::Regex;
use std::sync::OnceLock;

fn gps_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d{1,3}\.\d{5,}\s*,\s*-?\d{1,3}\.\d{5,}").unwrap())
}

fn base64_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]{1000,}={0,2}$").unwrap())
}

fn ssn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDataShape {
    Gps,
    Base64Payload,
    Ssn,
}

impl RawDataShape {
    pub fn violation_code(&self) -> &'static str {
        match self {
            RawDataShape::Gps => "RAW_GPS_DATA",
            RawDataShape::Base64Payload => "RAW_PAYLOAD_DATA",
            RawDataShape::Ssn => "RAW_PII_DATA",
        }
    }
}

/// Scan a string value for any of the three raw-data detectors, in the
/// order they're declared in spec §4.3.
pub fn detect_raw_data_shape(value: &str) -> Option<RawDataShape> {
    if gps_regex().is_match(value) {
        return Some(RawDataShape::Gps);
    }
    if base64_regex().is_match(value) {
        return Some(RawDataShape::Base64Payload);
    }
    if ssn_regex().is_match(value) {
        return Some(RawDataShape::Ssn);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_precise_gps() {
        assert_eq!(detect_raw_data_shape("37.42158, -122.08427"), Some(RawDataShape::Gps));
        assert_eq!(detect_raw_data_shape("geo_bucket_12"), None);
    }

    #[test]
    fn detects_base64_payload() {
        let blob = "A".repeat(1000);
        assert_eq!(detect_raw_data_shape(&blob), Some(RawDataShape::Base64Payload));
        assert_eq!(detect_raw_data_shape(&"A".repeat(999)), None);
    }

    #[test]
    fn detects_ssn_shape() {
        assert_eq!(detect_raw_data_shape("123-45-6789"), Some(RawDataShape::Ssn));
        assert_eq!(detect_raw_data_shape("12-345-6789"), None);
    }
}
