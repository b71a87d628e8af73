//! Reputation scoring (spec §4.5/§4.2): score in [0,100], initial 50,
//! moved by fixed integer impacts, with a bounded event history and a
//! decay pull toward neutral applied on read (Open Question decision #3
//! in the design doc).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INITIAL_SCORE: f64 = 50.0;
pub const HISTORY_CAP: usize = 100;
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReputationEventType {
    DisputeWon,
    DisputeLost,
    AbuseSignal,
    SuccessfulRequest,
    TargetingAttempt,
}

impl ReputationEventType {
    pub fn impact(&self) -> f64 {
        match self {
            ReputationEventType::DisputeWon => 2.0,
            ReputationEventType::DisputeLost => -5.0,
            ReputationEventType::AbuseSignal => -1.0,
            ReputationEventType::SuccessfulRequest => 0.1,
            ReputationEventType::TargetingAttempt => -10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    #[serde(rename = "type")]
    pub event_type: ReputationEventType,
    pub impact: f64,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationTier {
    Excellent,
    Good,
    Neutral,
    Poor,
    Restricted,
}

impl ReputationTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ReputationTier::Excellent
        } else if score >= 60.0 {
            ReputationTier::Good
        } else if score >= 40.0 {
            ReputationTier::Neutral
        } else if score >= 20.0 {
            ReputationTier::Poor
        } else {
            ReputationTier::Restricted
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reputation {
    pub requester_id: String,
    pub score: f64,
    pub last_updated: DateTime<Utc>,
    pub history: Vec<ReputationEvent>,
}

impl Reputation {
    pub fn new(requester_id: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            score: INITIAL_SCORE,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn tier(&self) -> ReputationTier {
        ReputationTier::from_score(self.score)
    }

    /// Apply a scoring event: push it onto the history (capped at
    /// `HISTORY_CAP`, oldest dropped first) and move the score by the
    /// event's fixed impact, clamped to [0, 100].
    pub fn apply_event(&mut self, event_type: ReputationEventType, details: impl Into<String>) {
        let impact = event_type.impact();
        let event = ReputationEvent {
            event_type,
            impact,
            timestamp: Utc::now(),
            details: details.into(),
        };
        self.history.push(event);
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(0..excess);
        }
        self.score = (self.score + impact).clamp(0.0, 100.0);
        self.last_updated = Utc::now();
    }

    /// Pull the score toward neutral (50) by `decay_rate` of the gap,
    /// scaled by elapsed days since `last_updated`. Applied lazily on
    /// read/mutate rather than via a background timer (decision #3).
    pub fn apply_decay(&mut self, decay_rate: f64) {
        let elapsed_days = (Utc::now() - self.last_updated).num_seconds() as f64 / 86_400.0;
        if elapsed_days <= 0.0 || decay_rate <= 0.0 {
            return;
        }
        let gap = NEUTRAL_SCORE - self.score;
        let pull = gap * decay_rate * elapsed_days;
        self.score = (self.score + pull).clamp(0.0, 100.0);
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_neutral_fifty() {
        let rep = Reputation::new("r1");
        assert_eq!(rep.score, 50.0);
        assert_eq!(rep.tier(), ReputationTier::Neutral);
    }

    #[test]
    fn score_clamped_after_repeated_penalties() {
        let mut rep = Reputation::new("r1");
        for _ in 0..20 {
            rep.apply_event(ReputationEventType::TargetingAttempt, "test");
        }
        assert_eq!(rep.score, 0.0);
    }

    #[test]
    fn score_clamped_after_repeated_rewards() {
        let mut rep = Reputation::new("r1");
        for _ in 0..30 {
            rep.apply_event(ReputationEventType::DisputeWon, "test");
        }
        assert_eq!(rep.score, 100.0);
    }

    #[test]
    fn history_capped_at_100_events() {
        let mut rep = Reputation::new("r1");
        for _ in 0..150 {
            rep.apply_event(ReputationEventType::SuccessfulRequest, "x");
        }
        assert_eq!(rep.history.len(), HISTORY_CAP);
    }

    #[test]
    fn decay_pulls_toward_neutral() {
        let mut rep = Reputation::new("r1");
        rep.score = 90.0;
        rep.last_updated = Utc::now() - chrono::Duration::days(10);
        rep.apply_decay(0.01);
        assert!(rep.score < 90.0);
        assert!(rep.score >= 50.0);
    }
}
