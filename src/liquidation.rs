//! Liquidation logic and conditions.
//!
//! A position is liquidatable once its net settlement (price pnl minus funding cost) is a
//! loss of at least `liquidation_threshold` of its margin. Liquidation forfeits the whole
//! margin: the trade fee comes off the top, the keeper earns a bounty on what remains, and
//! the vault keeps the rest.

use crate::math::{self, MathError};
use crate::types::{Amount, Bps, SignedAmount, BPS_BASE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationParams {
    /// Fraction of margin that, once lost, makes a position liquidatable.
    pub liquidation_threshold: Bps,
    /// Keeper's share of the margin left after the fee.
    pub liquidation_bounty: Bps,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            liquidation_threshold: Bps::new(8_000), // 80%
            liquidation_bounty: Bps::new(5_000),    // 50% of the remainder
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidationStatus {
    Healthy {
        net_settlement: SignedAmount,
    },
    Liquidatable {
        net_loss: Amount,
        threshold_loss: Amount,
    },
}

impl LiquidationStatus {
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, LiquidationStatus::Liquidatable { .. })
    }
}

/// Net amount the position settles for. negative = owes the vault.
pub fn net_settlement(pnl: SignedAmount, funding_cost: SignedAmount) -> Result<SignedAmount, MathError> {
    pnl.raw()
        .checked_sub(funding_cost.raw())
        .map(SignedAmount::new)
        .ok_or(MathError::Overflow)
}

/// Loss (in margin terms) at which liquidation kicks in.
pub fn threshold_loss(margin: Amount, params: &LiquidationParams) -> Result<Amount, MathError> {
    math::mul_div(margin.raw(), params.liquidation_threshold.raw(), BPS_BASE).map(Amount::new)
}

// boundary: a loss of exactly the threshold is liquidatable, one unit less is not
pub fn evaluate_liquidation(
    net_settlement: SignedAmount,
    margin: Amount,
    params: &LiquidationParams,
) -> Result<LiquidationStatus, MathError> {
    let threshold = threshold_loss(margin, params)?;

    if net_settlement.is_negative() && net_settlement.unsigned_abs() >= threshold {
        return Ok(LiquidationStatus::Liquidatable {
            net_loss: net_settlement.unsigned_abs(),
            threshold_loss: threshold,
        });
    }

    Ok(LiquidationStatus::Healthy { net_settlement })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationPayout {
    /// Fee actually collected, never more than the margin.
    pub fee: Amount,
    pub liquidator_reward: Amount,
    pub vault_credit: Amount,
}

pub fn calculate_liquidation_payout(
    margin: Amount,
    trade_fee: Amount,
    params: &LiquidationParams,
) -> Result<LiquidationPayout, MathError> {
    let fee = trade_fee.min(margin);
    let remaining = margin.saturating_sub(fee);
    let liquidator_reward =
        Amount::new(math::mul_div(remaining.raw(), params.liquidation_bounty.raw(), BPS_BASE)?);

    Ok(LiquidationPayout {
        fee,
        liquidator_reward,
        vault_credit: remaining.saturating_sub(liquidator_reward),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn units(v: u64) -> Amount {
        Amount::from_units(v)
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let params = LiquidationParams::default();
        let margin = units(1_000);
        let threshold = threshold_loss(margin, &params).unwrap();
        assert_eq!(threshold, units(800));

        let at = SignedAmount::new(-(threshold.raw() as i128));
        let just_under = SignedAmount::new(-(threshold.raw() as i128) + 1);

        assert!(evaluate_liquidation(at, margin, &params).unwrap().is_liquidatable());
        assert!(!evaluate_liquidation(just_under, margin, &params).unwrap().is_liquidatable());
    }

    #[test]
    fn profit_is_never_liquidatable() {
        let params = LiquidationParams::default();
        let status = evaluate_liquidation(SignedAmount::new(5), units(1), &params).unwrap();
        assert!(!status.is_liquidatable());
    }

    #[test]
    fn net_settlement_subtracts_funding() {
        let net = net_settlement(SignedAmount::new(100), SignedAmount::new(150)).unwrap();
        assert_eq!(net, SignedAmount::new(-50));
        // receiving funding improves the result
        let net = net_settlement(SignedAmount::new(-100), SignedAmount::new(-30)).unwrap();
        assert_eq!(net, SignedAmount::new(-70));
    }

    #[test]
    fn payout_splits_remaining_margin() {
        let params = LiquidationParams::default();
        let payout = calculate_liquidation_payout(units(1_000), units(10), &params).unwrap();
        assert_eq!(payout.fee, units(10));
        assert_eq!(payout.liquidator_reward.to_decimal(), dec!(495));
        assert_eq!(payout.vault_credit.to_decimal(), dec!(495));
    }

    #[test]
    fn fee_capped_at_margin() {
        let params = LiquidationParams::default();
        let payout = calculate_liquidation_payout(units(5), units(10), &params).unwrap();
        assert_eq!(payout.fee, units(5));
        assert_eq!(payout.liquidator_reward, Amount::ZERO);
        assert_eq!(payout.vault_credit, Amount::ZERO);
    }
}
