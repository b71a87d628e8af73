//! Reputation-scaled rate limiting (spec §4.5), generalised from
//! `middleware/rate_limit.rs`'s single-window-per-IP shape to three
//! rolling windows keyed by requester id and scaled by a reputation
//! multiplier.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const WINDOW_15M: Duration = Duration::from_secs(15 * 60);
const WINDOW_1H: Duration = Duration::from_secs(60 * 60);
const WINDOW_24H: Duration = Duration::from_secs(24 * 60 * 60);

pub const GC_IDLE_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RateLimitCaps {
    pub per_15m: u32,
    pub per_1h: u32,
    pub per_24h: u32,
}

impl Default for RateLimitCaps {
    fn default() -> Self {
        Self {
            per_15m: 10,
            per_1h: 30,
            per_24h: 100,
        }
    }
}

struct RateLimitEntry {
    instants: VecDeque<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            instants: VecDeque::new(),
            last_activity: Utc::now(),
        }
    }
}

pub enum RateLimitDecision {
    Allowed,
    Denied { retry_after: DateTime<Utc> },
}

/// Per-requester rate limiter. State lives in a sharded-by-key
/// `parking_lot::Mutex<HashMap<..>>`, exactly `RateLimitLayer`'s shape.
pub struct RateLimiter {
    caps: RateLimitCaps,
    state: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(caps: RateLimitCaps) -> Self {
        Self {
            caps,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// `check(requester)`: cleans entries older than the widest window,
    /// counts each window against the reputation-scaled cap, records the
    /// request if allowed, and on denial returns the earliest retry
    /// instant (spec §4.5).
    pub fn check(&self, requester_id: &str, reputation_score: f64) -> RateLimitDecision {
        let multiplier = (reputation_score / 50.0).clamp(0.5, 2.0);
        let now = Utc::now();

        let mut state = self.state.lock();
        let entry = state
            .entry(requester_id.to_string())
            .or_insert_with(RateLimitEntry::new);

        let cutoff = now - chrono::Duration::from_std(WINDOW_24H).unwrap();
        while entry.instants.front().is_some_and(|t| *t < cutoff) {
            entry.instants.pop_front();
        }

        let count_within = |window: Duration| -> u32 {
            let window_cutoff = now - chrono::Duration::from_std(window).unwrap();
            entry.instants.iter().filter(|t| **t >= window_cutoff).count() as u32
        };

        let cap_15m = ((self.caps.per_15m as f64) * multiplier).round() as u32;
        let cap_1h = ((self.caps.per_1h as f64) * multiplier).round() as u32;
        let cap_24h = ((self.caps.per_24h as f64) * multiplier).round() as u32;

        if count_within(WINDOW_15M) >= cap_15m {
            let retry_after = entry.instants.iter().rev().nth((cap_15m as usize).saturating_sub(1))
                .map(|t| *t + chrono::Duration::from_std(WINDOW_15M).unwrap())
                .unwrap_or(now);
            entry.last_activity = now;
            return RateLimitDecision::Denied { retry_after };
        }
        if count_within(WINDOW_1H) >= cap_1h {
            let retry_after = entry.instants.iter().rev().nth((cap_1h as usize).saturating_sub(1))
                .map(|t| *t + chrono::Duration::from_std(WINDOW_1H).unwrap())
                .unwrap_or(now);
            entry.last_activity = now;
            return RateLimitDecision::Denied { retry_after };
        }
        if count_within(WINDOW_24H) >= cap_24h {
            let retry_after = entry.instants.front()
                .map(|t| *t + chrono::Duration::from_std(WINDOW_24H).unwrap())
                .unwrap_or(now);
            entry.last_activity = now;
            return RateLimitDecision::Denied { retry_after };
        }

        entry.instants.push_back(now);
        entry.last_activity = now;
        RateLimitDecision::Allowed
    }

    /// Hourly GC: drop entries idle for more than 7 days (spec §4.5/§9).
    pub fn gc(&self) {
        let now = Utc::now();
        let threshold = chrono::Duration::from_std(GC_IDLE_THRESHOLD).unwrap();
        let mut state = self.state.lock();
        state.retain(|_, entry| now - entry.last_activity < threshold);
    }

    #[cfg(test)]
    pub fn tracked_requesters(&self) -> usize {
        self.state.lock().len()
    }
}
