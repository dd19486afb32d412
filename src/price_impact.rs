//! Price impact model.
//!
//! Execution price departs from the mark by a multiplier built from two parts: a concave
//! depth term against the instrument's virtual reserve, and a skew shift proportional to
//! `(oi_long - oi_short) / max_exposure`. A shift that works against the trader is applied in
//! full; a shift that works in the trader's favor is divided by `shift_divider`. That holds on
//! both sides of the book, so buys dampen the negative branch and sells dampen the positive
//! one. Must be evaluated against pre-trade open interest.

use crate::math::{self, MathError};
use crate::types::{Amount, Price, BASE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactParams {
    /// Shift at full skew, as a fraction of BASE (300_000 = 0.3%).
    pub max_shift: u128,
    /// Damping applied to the favorable shift branch.
    pub shift_divider: u128,
}

impl Default for ImpactParams {
    fn default() -> Self {
        Self {
            max_shift: 300_000,
            shift_divider: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ImpactError {
    #[error("buy of {size} exhausts reserve depth {reserve}")]
    ExceedsReserve { size: Amount, reserve: Amount },

    #[error("skew shift drives execution price to zero")]
    NonPositivePrice,

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Everything the model needs about the instrument, captured before the trade mutates OI.
#[derive(Debug, Clone, Copy)]
pub struct ImpactInput {
    pub mark_price: Price,
    pub open_interest_long: Amount,
    pub open_interest_short: Amount,
    pub max_exposure: Amount,
    pub reserve_depth: Amount,
    pub size: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shift {
    magnitude: u128,
    non_negative: bool,
}

// magnitude is floored, sign carried separately
fn skew_shift(input: &ImpactInput, params: &ImpactParams) -> Result<Shift, MathError> {
    if input.max_exposure.is_zero() {
        return Ok(Shift {
            magnitude: 0,
            non_negative: true,
        });
    }

    let longs = input.open_interest_long.raw();
    let shorts = input.open_interest_short.raw();
    let non_negative = longs >= shorts;
    let skew = if non_negative { longs - shorts } else { shorts - longs };

    Ok(Shift {
        magnitude: math::mul_div(skew, params.max_shift, input.max_exposure.raw())?,
        non_negative,
    })
}

/// Execution price for a trade that buys (`is_buy`) or sells `input.size` notional.
/// Opening a long and closing a short are buys.
pub fn execution_price(
    input: &ImpactInput,
    is_buy: bool,
    params: &ImpactParams,
) -> Result<Price, ImpactError> {
    let reserve = input.reserve_depth.raw();
    let amount = input.size.raw();
    if reserve == 0 || amount == 0 {
        return Ok(input.mark_price);
    }

    let shift = skew_shift(input, params)?;
    let divider = params.shift_divider.max(1);
    let reserve_sq = math::mul(reserve, reserve)?;

    let slippage = if is_buy {
        if amount >= reserve {
            return Err(ImpactError::ExceedsReserve {
                size: input.size,
                reserve: input.reserve_depth,
            });
        }
        let depth = math::sub(reserve_sq / (reserve - amount), reserve)?;
        let base = math::mul_div(depth, BASE, amount)?;
        if shift.non_negative {
            math::add(base, shift.magnitude)?
        } else {
            base.checked_sub(shift.magnitude / divider)
                .ok_or(ImpactError::NonPositivePrice)?
        }
    } else {
        let depth = math::sub(reserve, reserve_sq / math::add(reserve, amount)?)?;
        let base = math::mul_div(depth, BASE, amount)?;
        if shift.non_negative {
            math::add(base, shift.magnitude / divider)?
        } else {
            base.checked_sub(shift.magnitude)
                .ok_or(ImpactError::NonPositivePrice)?
        }
    };

    let price = math::mul_div(input.mark_price.raw(), slippage, BASE)?;
    Price::new(price).ok_or(ImpactError::NonPositivePrice)
}
