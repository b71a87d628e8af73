//! External Escrow Account collaborator (spec §4.7, §9 "external
//! dependency failure" edge case): the coordinator never moves money
//! itself, it instructs this boundary trait.

use crate::model::{Money, RequesterId};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait EscrowAccount: Send + Sync {
    async fn has_sufficient_funds(&self, requester_id: &RequesterId, amount: Money) -> Result<bool>;
    async fn release(&self, hold_id: uuid::Uuid, to_ds: &str, amount: Money) -> Result<()>;
    async fn refund(&self, hold_id: uuid::Uuid, to_requester: &RequesterId, amount: Money) -> Result<()>;
}

/// In-process stand-in used by tests and local runs: an
/// always-sufficiently-funded ledger that just records calls.
pub struct InMemoryEscrowAccount {
    funded: parking_lot::Mutex<std::collections::HashMap<RequesterId, Money>>,
}

impl InMemoryEscrowAccount {
    pub fn new() -> Self {
        Self {
            funded: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn fund(&self, requester_id: &RequesterId, amount: Money) {
        let mut funded = self.funded.lock();
        *funded.entry(requester_id.clone()).or_insert(Money::ZERO) += amount;
    }
}

impl Default for InMemoryEscrowAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EscrowAccount for InMemoryEscrowAccount {
    async fn has_sufficient_funds(&self, requester_id: &RequesterId, amount: Money) -> Result<bool> {
        let funded = self.funded.lock();
        Ok(funded.get(requester_id).copied().unwrap_or(Money::ZERO) >= amount)
    }

    async fn release(&self, _hold_id: uuid::Uuid, _to_ds: &str, _amount: Money) -> Result<()> {
        Ok(())
    }

    async fn refund(&self, _hold_id: uuid::Uuid, to_requester: &RequesterId, amount: Money) -> Result<()> {
        let mut funded = self.funded.lock();
        *funded.entry(to_requester.clone()).or_insert(Money::ZERO) += amount;
        Ok(())
    }
}
