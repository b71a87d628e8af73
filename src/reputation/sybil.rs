//! Sybil pattern detection (spec §4.5): requesters submitting the same
//! behavioural fingerprint are tracked, and a fingerprint shared by
//! enough distinct requesters is reported as suspicious without ever
//! exposing the underlying pattern.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub const SYBIL_THRESHOLD: usize = 5;

#[derive(Debug, Clone)]
pub struct BehaviouralPattern {
    pub scope_categories: Vec<String>,
    pub cohort_size_bucket: String,
    pub compensation_bucket: String,
    pub duration_bucket: String,
    pub time_of_day_bucket: String,
}

impl BehaviouralPattern {
    /// `sorted(scope_categories) | cohort_size_bucket | compensation_bucket
    /// | duration_bucket | time_of_day_bucket` (spec §4.5), hashed with
    /// SHA-256 so the returned fingerprint never carries the raw terms.
    pub fn fingerprint(&self) -> String {
        let mut categories = self.scope_categories.clone();
        categories.sort();
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            categories.join(","),
            self.cohort_size_bucket,
            self.compensation_bucket,
            self.duration_bucket,
            self.time_of_day_bucket,
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub struct SybilAnalysis {
    pub fingerprint: String,
    pub suspicious: bool,
    pub matching_requesters: usize,
}

struct SybilRecord {
    requesters: HashSet<String>,
    last_activity: chrono::DateTime<chrono::Utc>,
}

pub struct SybilStore {
    patterns: Mutex<HashMap<String, SybilRecord>>,
}

impl SybilStore {
    pub fn new() -> Self {
        Self {
            patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, requester_id: &str, pattern: &BehaviouralPattern) -> SybilAnalysis {
        let fingerprint = pattern.fingerprint();

        let mut patterns = self.patterns.lock();
        let record = patterns.entry(fingerprint.clone()).or_insert_with(|| SybilRecord {
            requesters: HashSet::new(),
            last_activity: chrono::Utc::now(),
        });
        record.requesters.insert(requester_id.to_string());
        record.last_activity = chrono::Utc::now();

        let matching_requesters = record.requesters.len();
        SybilAnalysis {
            fingerprint,
            suspicious: matching_requesters >= SYBIL_THRESHOLD,
            matching_requesters,
        }
    }

    pub fn gc(&self, idle_threshold: chrono::Duration) {
        let now = chrono::Utc::now();
        let mut patterns = self.patterns.lock();
        patterns.retain(|_, record| now - record.last_activity < idle_threshold);
    }
}

impl Default for SybilStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> BehaviouralPattern {
        BehaviouralPattern {
            scope_categories: vec!["travel".to_string(), "location".to_string()],
            cohort_size_bucket: "50".to_string(),
            compensation_bucket: "100".to_string(),
            duration_bucket: "14".to_string(),
            time_of_day_bucket: "evening".to_string(),
        }
    }

    #[test]
    fn fingerprint_is_64_hex_chars_and_order_independent() {
        let a = pattern();
        let mut b = pattern();
        b.scope_categories.reverse();
        let fp_a = a.fingerprint();
        let fp_b = b.fingerprint();
        assert_eq!(fp_a.len(), 64);
        assert!(fp_a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn fingerprint_excludes_raw_pattern_terms() {
        let fp = pattern().fingerprint();
        assert!(!fp.contains("travel"));
        assert!(!fp.contains("evening"));
    }

    #[test]
    fn sixth_distinct_requester_trips_suspicious() {
        let store = SybilStore::new();
        let p = pattern();
        let mut last = store.record("req-0", &p);
        for i in 1..6 {
            last = store.record(&format!("req-{i}"), &p);
        }
        assert!(last.suspicious);
        assert!(last.matching_requesters >= SYBIL_THRESHOLD);
        assert_eq!(last.fingerprint.len(), 64);
    }

    #[test]
    fn repeated_requester_does_not_inflate_count() {
        let store = SybilStore::new();
        let p = pattern();
        store.record("req-0", &p);
        let second = store.record("req-0", &p);
        assert_eq!(second.matching_requesters, 1);
        assert!(!second.suspicious);
    }
}
