//! C5 — Reputation & Abuse Prevention (spec §4.5).

mod abuse;
mod rate_limit;
mod scoring;
mod sybil;

pub use abuse::{anonymise_node_id, AbuseSignalStore};
pub use rate_limit::{RateLimitCaps, RateLimitDecision, RateLimiter};
pub use scoring::{Reputation, ReputationEvent, ReputationEventType, ReputationTier};
pub use sybil::{BehaviouralPattern, SybilAnalysis, SybilStore};

use crate::storage::Store;
use anyhow::Result;
use std::sync::Arc;

/// Entries idle longer than this are dropped by the hourly GC sweep
/// (spec §4.5 "Hourly: drop ... older than 7 days").
pub const GC_IDLE_THRESHOLD_DAYS: i64 = 7;

/// Ties the persisted `Reputation` record to the in-process ephemeral
/// stores (rate limiter, abuse aggregates, sybil patterns) behind one
/// facade, as spec §9's global-mutable-state note recommends.
pub struct ReputationService {
    store: Arc<Store>,
    decay_rate: f64,
    rate_limiter: RateLimiter,
    abuse: AbuseSignalStore,
    sybil: SybilStore,
}

impl ReputationService {
    pub fn new(store: Arc<Store>, caps: RateLimitCaps, decay_rate: f64) -> Self {
        Self {
            store,
            decay_rate,
            rate_limiter: RateLimiter::new(caps),
            abuse: AbuseSignalStore::new(),
            sybil: SybilStore::new(),
        }
    }

    /// Load (or initialise) a requester's reputation, applying decay for
    /// elapsed time since the last update before returning it.
    pub async fn get_or_init(&self, requester_id: &str) -> Result<Reputation> {
        let mut reputation = match self.store.get_reputation(requester_id).await? {
            Some(r) => r,
            None => Reputation::new(requester_id),
        };
        reputation.apply_decay(self.decay_rate);
        Ok(reputation)
    }

    /// Check the three-window rate limit, scaled by the requester's
    /// current (decayed) reputation score.
    pub async fn check_rate_limit(&self, requester_id: &str) -> Result<RateLimitDecision> {
        let reputation = self.get_or_init(requester_id).await?;
        Ok(self.rate_limiter.check(requester_id, reputation.score))
    }

    /// Apply a scoring event and persist the updated reputation.
    pub async fn record_event(
        &self,
        requester_id: &str,
        event_type: ReputationEventType,
        details: impl Into<String>,
    ) -> Result<Reputation> {
        let mut reputation = self.get_or_init(requester_id).await?;
        reputation.apply_event(event_type, details);
        self.store.upsert_reputation(&reputation).await?;
        Ok(reputation)
    }

    /// Record one node's abuse report; penalise the requester's
    /// reputation the first time the unique-node count crosses the
    /// threshold (spec §4.5).
    pub async fn record_abuse_signal(
        &self,
        requester_id: &str,
        signal_type: &str,
        node_id: &str,
    ) -> Result<Option<Reputation>> {
        if self.abuse.record(requester_id, signal_type, node_id) {
            let reputation = self
                .record_event(
                    requester_id,
                    ReputationEventType::AbuseSignal,
                    format!("abuse signal threshold reached: {signal_type}"),
                )
                .await?;
            return Ok(Some(reputation));
        }
        Ok(None)
    }

    pub fn record_sybil_pattern(
        &self,
        requester_id: &str,
        pattern: &BehaviouralPattern,
    ) -> SybilAnalysis {
        self.sybil.record(requester_id, pattern)
    }

    /// Hourly GC sweep: drop idle rate-limit, abuse and sybil state
    /// (spec §4.5).
    pub fn gc(&self) {
        self.rate_limiter.gc();
        let threshold = chrono::Duration::days(GC_IDLE_THRESHOLD_DAYS);
        self.abuse.gc(threshold);
        self.sybil.gc(threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[tokio::test]
    async fn targeting_attempt_drops_score_by_ten() {
        let store = Arc::new(Store::in_memory().unwrap());
        let service = ReputationService::new(store, RateLimitCaps::default(), 0.0);
        let reputation = service
            .record_event("req-1", ReputationEventType::TargetingAttempt, "raw data attempt")
            .await
            .unwrap();
        assert_eq!(reputation.score, 40.0);
    }

    #[tokio::test]
    async fn abuse_signal_penalises_once_at_threshold() {
        let store = Arc::new(Store::in_memory().unwrap());
        let service = ReputationService::new(store, RateLimitCaps::default(), 0.0);
        let mut penalised = 0;
        for i in 0..10 {
            if service
                .record_abuse_signal("req-1", "SLOW_DELIVERY", &format!("node-{i}"))
                .await
                .unwrap()
                .is_some()
            {
                penalised += 1;
            }
        }
        assert_eq!(penalised, 1);
    }
}
