//! Client-side cache of the server's recommendation credit balance.

use chrono::{DateTime, Utc};

/// Mirror of a server-held, non-increasing counter. Only authoritative
/// server values are ever written; nothing is decremented locally.
#[derive(Debug, Clone, Default)]
pub struct CreditLedger {
    remaining: Option<u32>,
    synced_at: Option<DateTime<Utc>>,
}

impl CreditLedger {
    /// A ledger that has not heard from the server yet. Gates like zero.
    pub fn unseeded() -> Self {
        Self::default()
    }

    pub fn seeded(remaining: u32) -> Self {
        let mut ledger = Self::default();
        ledger.sync(remaining);
        ledger
    }

    /// Overwrite with a value reported by the server.
    pub fn sync(&mut self, remaining: u32) {
        if let Some(previous) = self.remaining
            && remaining > previous
        {
            tracing::warn!(
                "server reported {} credits, more than the cached {}; accepting server value",
                remaining,
                previous
            );
        }
        self.remaining = Some(remaining);
        self.synced_at = Some(Utc::now());
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn can_recommend(&self) -> bool {
        self.remaining.is_some_and(|n| n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseeded_ledger_blocks() {
        let ledger = CreditLedger::unseeded();
        assert!(!ledger.can_recommend());
        assert!(ledger.synced_at().is_none());
    }

    #[test]
    fn zero_blocks_and_positive_allows() {
        assert!(!CreditLedger::seeded(0).can_recommend());
        assert!(CreditLedger::seeded(1).can_recommend());
    }

    #[test]
    fn sync_overwrites_rather_than_decrements() {
        let mut ledger = CreditLedger::seeded(5);
        ledger.sync(2);
        assert_eq!(ledger.remaining(), Some(2));
        ledger.sync(3);
        assert_eq!(ledger.remaining(), Some(3));
    }
}
