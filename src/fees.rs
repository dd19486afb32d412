// fees.rs: every trade fee is carved up in one place. referral rebates come off the top,
// the remainder splits between the vault reward pool and the staking reward pool.
// the pools accumulate here until the reward router pulls them.

use crate::math::{self, MathError};
use crate::referral::ReferrerInfo;
use crate::types::{AccountId, Amount, Bps, BPS_BASE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    /// Share of the post-rebate fee routed to vault rewards. the rest goes to staking.
    pub vault_fee_ratio: Bps,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            vault_fee_ratio: Bps::new(7_000), // 70/30
        }
    }
}

/// Trade fee on a notional size: `size * fee_rate / BPS_BASE`.
pub fn calculate_trade_fee(size: Amount, fee_rate: Bps) -> Result<Amount, MathError> {
    math::mul_div(size.raw(), fee_rate.raw(), BPS_BASE).map(Amount::new)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub fee: Amount,
    pub referrer: Option<(AccountId, Amount)>,
    pub trader_rebate: Amount,
    pub vault_reward: Amount,
    pub staking_reward: Amount,
}

pub fn split_fee(
    fee: Amount,
    referral: Option<&ReferrerInfo>,
    params: &FeeParams,
) -> Result<FeeSplit, MathError> {
    let (referrer, trader_rebate) = match referral {
        Some(info) => {
            let to_referrer = math::mul_div(fee.raw(), info.referrer_rebate.raw(), BPS_BASE)?;
            let to_trader = math::mul_div(fee.raw(), info.trader_rebate.raw(), BPS_BASE)?;
            (Some((info.referrer, Amount::new(to_referrer))), Amount::new(to_trader))
        }
        None => (None, Amount::ZERO),
    };

    let rebates = math::add(referrer.map_or(0, |(_, a)| a.raw()), trader_rebate.raw())?;
    let remainder = math::sub(fee.raw(), rebates)?;
    let vault_reward = math::mul_div(remainder, params.vault_fee_ratio.raw(), BPS_BASE)?;

    Ok(FeeSplit {
        fee,
        referrer,
        trader_rebate,
        vault_reward: Amount::new(vault_reward),
        staking_reward: Amount::new(remainder - vault_reward),
    })
}

/// Reward pools waiting for the router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRewards {
    pub vault: Amount,
    pub staking: Amount,
}

impl PendingRewards {
    pub fn accrue(&mut self, split: &FeeSplit) -> Result<(), MathError> {
        self.vault = Amount::new(math::add(self.vault.raw(), split.vault_reward.raw())?);
        self.staking = Amount::new(math::add(self.staking.raw(), split.staking_reward.raw())?);
        Ok(())
    }

    pub fn drain_vault(&mut self) -> Amount {
        std::mem::take(&mut self.vault)
    }

    pub fn drain_staking(&mut self) -> Amount {
        std::mem::take(&mut self.staking)
    }

    pub fn total(&self) -> Amount {
        Amount::new(self.vault.raw().saturating_add(self.staking.raw()))
    }
}
