// 5.0: funding. the heavier side pays the lighter side, continuously, at a rate set by the
// OI imbalance relative to max exposure. the vault sits on the other side of every position,
// so what a position pays or earns flows to or from the vault through its settlement pnl.
// 5.0 has the params/state structs. 5.1+ has the rate and accrual logic.

use crate::math::{self, MathError};
use crate::types::{Amount, Side, SignedAmount, Timestamp, FUNDING_BASE, SECONDS_PER_YEAR};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingParams {
    /// Annualized cap on |rate|, scaled by FUNDING_BASE.
    pub max_funding_rate: i128,
    /// Floor applied to every instrument's multiplier.
    pub min_funding_multiplier: i128,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            max_funding_rate: FUNDING_BASE / 2,     // 50% APR
            min_funding_multiplier: FUNDING_BASE / 10, // 10% APR at full skew
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    /// Signed cumulative index. grows while longs are heavier, shrinks while shorts are.
    pub cumulative: i128,
    /// None until the first trade touches the instrument.
    pub last_update: Option<Timestamp>,
    /// Annualized rate charged when |skew| equals max exposure, scaled by FUNDING_BASE.
    pub multiplier: i128,
}

impl FundingState {
    pub fn new(multiplier: i128) -> Self {
        Self {
            cumulative: 0,
            last_update: None,
            multiplier,
        }
    }

    /// Index value if accrual ran at `now` with `rate`, without touching state.
    pub fn preview(&self, rate: i128, now: Timestamp) -> Result<i128, MathError> {
        match self.last_update {
            None => Ok(self.cumulative),
            Some(last) => {
                let accrued = accrual(rate, now.secs_since(last))?;
                self.cumulative.checked_add(accrued).ok_or(MathError::Overflow)
            }
        }
    }

    /// 5.2: first call only stamps the clock. later calls add rate * elapsed / year.
    /// returns the accrued delta, or None when this call initialized the clock.
    pub fn accrue(&mut self, rate: i128, now: Timestamp) -> Result<Option<i128>, MathError> {
        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return Ok(None);
        };

        let accrued = accrual(rate, now.secs_since(last))?;
        self.cumulative = self.cumulative.checked_add(accrued).ok_or(MathError::Overflow)?;
        self.last_update = Some(now);
        Ok(Some(accrued))
    }
}

fn accrual(rate: i128, elapsed_secs: i64) -> Result<i128, MathError> {
    math::mul_div_signed(rate, elapsed_secs as i128, SECONDS_PER_YEAR)
}

// 5.1: |skew| * multiplier / max exposure, capped, signed toward the heavier side.
// positive charges longs and pays shorts.
pub fn calculate_funding_rate(
    open_interest_long: Amount,
    open_interest_short: Amount,
    multiplier: i128,
    max_exposure: Amount,
    params: &FundingParams,
) -> Result<i128, MathError> {
    if max_exposure.is_zero() {
        return Ok(0);
    }

    let multiplier = multiplier.max(params.min_funding_multiplier).max(0);
    let longs_heavier = open_interest_long >= open_interest_short;
    let skew = if longs_heavier {
        open_interest_long.raw() - open_interest_short.raw()
    } else {
        open_interest_short.raw() - open_interest_long.raw()
    };

    let magnitude = math::mul_div(skew, multiplier as u128, max_exposure.raw())?;
    let capped = math::to_signed(magnitude)?.min(params.max_funding_rate.max(0));

    Ok(if longs_heavier { capped } else { -capped })
}

// 5.3: what a position owes for funding since it was opened. positive = position pays.
// shorts see the index delta flipped before the floor division.
pub fn calculate_funding_cost(
    side: Side,
    size: Amount,
    entry_funding: i128,
    cumulative: i128,
) -> Result<SignedAmount, MathError> {
    let delta = match side {
        Side::Long => cumulative.checked_sub(entry_funding),
        Side::Short => entry_funding.checked_sub(cumulative),
    }
    .ok_or(MathError::Overflow)?;

    math::mul_div_signed(math::to_signed(size.raw())?, delta, FUNDING_BASE).map(SignedAmount::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn units(v: u64) -> Amount {
        Amount::from_units(v)
    }

    #[test]
    fn balanced_book_has_zero_rate() {
        let rate = calculate_funding_rate(units(500), units(500), FUNDING_BASE, units(10_000), &FundingParams::default()).unwrap();
        assert_eq!(rate, 0);
    }

    #[test]
    fn rate_signed_toward_heavier_side() {
        let params = FundingParams::default();
        // skew is 10% of max exposure, multiplier 100% -> 10% APR
        let longs = calculate_funding_rate(units(2_000), units(1_000), FUNDING_BASE, units(10_000), &params).unwrap();
        assert_eq!(longs, FUNDING_BASE / 10);

        let shorts = calculate_funding_rate(units(1_000), units(2_000), FUNDING_BASE, units(10_000), &params).unwrap();
        assert_eq!(shorts, -FUNDING_BASE / 10);
    }

    #[test]
    fn rate_capped() {
        let params = FundingParams::default();
        let rate = calculate_funding_rate(units(10_000), Amount::ZERO, FUNDING_BASE, units(10_000), &params).unwrap();
        assert_eq!(rate, params.max_funding_rate);
    }

    #[test]
    fn multiplier_floor_applies() {
        let params = FundingParams::default();
        let rate = calculate_funding_rate(units(1_000), Amount::ZERO, 0, units(10_000), &params).unwrap();
        // 10% skew * 10% floor multiplier
        assert_eq!(rate, FUNDING_BASE / 100);
    }

    #[test]
    fn empty_vault_disables_funding() {
        let rate = calculate_funding_rate(units(1_000), Amount::ZERO, FUNDING_BASE, Amount::ZERO, &FundingParams::default()).unwrap();
        assert_eq!(rate, 0);
    }

    #[test]
    fn first_accrual_only_initializes() {
        let mut state = FundingState::new(FUNDING_BASE);
        assert_eq!(state.accrue(FUNDING_BASE, Timestamp::from_secs(1_000)).unwrap(), None);
        assert_eq!(state.cumulative, 0);
        assert_eq!(state.last_update, Some(Timestamp::from_secs(1_000)));
    }

    #[test]
    fn accrual_is_time_weighted() {
        let mut state = FundingState::new(FUNDING_BASE);
        state.accrue(0, Timestamp::from_secs(0)).unwrap();

        let half_year = (SECONDS_PER_YEAR / 2) as i64;
        let preview = state.preview(FUNDING_BASE, Timestamp::from_secs(half_year)).unwrap();
        let accrued = state.accrue(FUNDING_BASE, Timestamp::from_secs(half_year)).unwrap();

        assert_eq!(accrued, Some(FUNDING_BASE / 2));
        assert_eq!(state.cumulative, FUNDING_BASE / 2);
        assert_eq!(preview, state.cumulative);
    }

    #[test]
    fn funding_cost_long_pays_when_index_rises() {
        // 10k size, index moved 1% of a year at 100% APR -> 1% of size
        let cost = calculate_funding_cost(Side::Long, units(10_000), 0, FUNDING_BASE / 100).unwrap();
        assert_eq!(cost.to_decimal(), dec!(100));

        let short = calculate_funding_cost(Side::Short, units(10_000), 0, FUNDING_BASE / 100).unwrap();
        assert_eq!(short.to_decimal(), dec!(-100));
    }

    #[test]
    fn funding_cost_floors_at_boundary() {
        // size of 1 raw unit with a sub-unit delta: +0.x floors to 0, -0.x floors to -1
        assert_eq!(calculate_funding_cost(Side::Long, Amount::new(1), 0, 1).unwrap(), SignedAmount::ZERO);
        assert_eq!(calculate_funding_cost(Side::Short, Amount::new(1), 0, 1).unwrap(), SignedAmount::new(-1));
    }
}
