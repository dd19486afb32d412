// referral.rs: the registry that maps traders to referrers lives outside the engine.
// the engine only asks who referred a trader and at what rebate rates.
// ReferralBook is the in-memory registry used by tests and the simulator.

use crate::types::{AccountId, Bps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerInfo {
    pub referrer: AccountId,
    /// Share of the trade fee credited to the referrer.
    pub referrer_rebate: Bps,
    /// Share of the trade fee credited back to the trader.
    pub trader_rebate: Bps,
}

impl ReferrerInfo {
    /// Rebates can't hand out more than the fee.
    pub fn validate(&self) -> Result<(), ReferralError> {
        let total = self.referrer_rebate.raw() + self.trader_rebate.raw();
        if total > Bps::FULL.raw() {
            return Err(ReferralError::RebatesExceedFee {
                referrer_rebate: self.referrer_rebate,
                trader_rebate: self.trader_rebate,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ReferralError {
    #[error("referral rebates {referrer_rebate:?} + {trader_rebate:?} exceed 100%")]
    RebatesExceedFee {
        referrer_rebate: Bps,
        trader_rebate: Bps,
    },

    #[error("referral registry unavailable: {0}")]
    Unavailable(String),
}

pub trait ReferralRegistry: Send + Sync + Debug {
    /// None when the trader has no active referral.
    fn referrer_info(&self, trader: AccountId) -> Result<Option<ReferrerInfo>, ReferralError>;
}

#[derive(Debug, Default)]
pub struct ReferralBook {
    links: RwLock<HashMap<AccountId, ReferrerInfo>>,
}

impl ReferralBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trader: AccountId, info: ReferrerInfo) {
        if let Ok(mut links) = self.links.write() {
            links.insert(trader, info);
        }
    }

    pub fn unregister(&self, trader: AccountId) {
        if let Ok(mut links) = self.links.write() {
            links.remove(&trader);
        }
    }
}

impl ReferralRegistry for ReferralBook {
    fn referrer_info(&self, trader: AccountId) -> Result<Option<ReferrerInfo>, ReferralError> {
        let links = self
            .links
            .read()
            .map_err(|_| ReferralError::Unavailable("referral lock poisoned".to_string()))?;
        Ok(links.get(&trader).copied())
    }
}

/// Registry with no referrals at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferrals;

impl ReferralRegistry for NoReferrals {
    fn referrer_info(&self, _trader: AccountId) -> Result<Option<ReferrerInfo>, ReferralError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_lookup() {
        let book = ReferralBook::new();
        let info = ReferrerInfo {
            referrer: AccountId(7),
            referrer_rebate: Bps::new(1_000),
            trader_rebate: Bps::new(500),
        };
        book.register(AccountId(1), info);

        assert_eq!(book.referrer_info(AccountId(1)).unwrap(), Some(info));
        assert_eq!(book.referrer_info(AccountId(2)).unwrap(), None);

        book.unregister(AccountId(1));
        assert_eq!(book.referrer_info(AccountId(1)).unwrap(), None);
    }

    #[test]
    fn rebates_above_full_fee_rejected() {
        let info = ReferrerInfo {
            referrer: AccountId(7),
            referrer_rebate: Bps::new(6_000),
            trader_rebate: Bps::new(4_001),
        };
        assert!(info.validate().is_err());

        let exact = ReferrerInfo {
            trader_rebate: Bps::new(4_000),
            ..info
        };
        assert!(exact.validate().is_ok());
    }
}
