//! Risk limits.
//!
//! Two bounds protect the vault. Exposure: on each instrument the heavier side may exceed
//! the lighter side by at most `max_exposure`, which is the instrument's weighted slice of
//! the vault balance. Utilization: total open interest across instruments may not exceed
//! `balance * utilization_multiplier`. Both are checked after any collaborator call returns
//! and before the transaction commits.

use crate::math::{self, MathError};
use crate::types::{Amount, Bps, InstrumentId, Price, Side, Timestamp, BPS_BASE};
use serde::{Deserialize, Serialize};

/// Exchange-wide risk parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Smallest margin accepted by open and add-margin.
    pub min_margin: Amount,
    /// Exclusive upper bound on margin per open call.
    pub max_margin: Amount,
    /// Total OI may reach `balance * utilization_multiplier`.
    pub utilization_multiplier: Bps,
    /// Scales every instrument's max exposure.
    pub exposure_multiplier: Bps,
    /// Profits are zeroed on positions younger than this unless the price moved enough.
    /// zero disables the guard.
    pub min_profit_time_secs: i64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            min_margin: Amount::from_units(10),
            max_margin: Amount::from_units(1_000_000_000),
            utilization_multiplier: Bps::new(10_000), // 100%
            exposure_multiplier: Bps::new(10_000),
            min_profit_time_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskViolation {
    Exposure {
        instrument: InstrumentId,
        side: Side,
        open_interest: Amount,
        limit: Amount,
    },
    Utilization {
        open_interest: Amount,
        limit: Amount,
    },
}

/// `balance * weight * exposure_multiplier / total_weight / BPS_BASE`.
pub fn max_exposure(
    vault_balance: Amount,
    weight: u64,
    total_weight: u64,
    params: &RiskParams,
) -> Result<Amount, MathError> {
    if total_weight == 0 {
        return Ok(Amount::ZERO);
    }
    let weighted = math::mul(vault_balance.raw(), weight as u128)?;
    let scaled = math::mul_div(weighted, params.exposure_multiplier.raw(), total_weight as u128)?;
    Ok(Amount::new(scaled / BPS_BASE))
}

/// Largest total OI the vault supports.
pub fn utilization_limit(vault_balance: Amount, params: &RiskParams) -> Result<Amount, MathError> {
    math::mul_div(vault_balance.raw(), params.utilization_multiplier.raw(), BPS_BASE).map(Amount::new)
}

// compared as oi * BPS_BASE <= balance * multiplier so the bound isn't rounded
pub fn check_utilization(
    total_open_interest: Amount,
    vault_balance: Amount,
    params: &RiskParams,
) -> Result<Result<(), RiskViolation>, MathError> {
    let used = math::mul(total_open_interest.raw(), BPS_BASE)?;
    let available = math::mul(vault_balance.raw(), params.utilization_multiplier.raw())?;
    if used > available {
        return Ok(Err(RiskViolation::Utilization {
            open_interest: total_open_interest,
            limit: utilization_limit(vault_balance, params)?,
        }));
    }
    Ok(Ok(()))
}

pub fn check_exposure(
    instrument: InstrumentId,
    side: Side,
    side_open_interest: Amount,
    other_open_interest: Amount,
    max_exposure: Amount,
) -> Result<Result<(), RiskViolation>, MathError> {
    let limit = math::add(other_open_interest.raw(), max_exposure.raw())?;
    if side_open_interest.raw() > limit {
        return Ok(Err(RiskViolation::Exposure {
            instrument,
            side,
            open_interest: side_open_interest,
            limit: Amount::new(limit),
        }));
    }
    Ok(Ok(()))
}

/// Front-running guard on close: a winning position may book its profit once it has been
/// open past `min_profit_time_secs`, or once the exit price has moved `min_price_change` in its favor.
pub fn can_take_profit(
    side: Side,
    entry_price: Price,
    opened_at: Timestamp,
    exit_price: Price,
    min_price_change: Bps,
    now: Timestamp,
    params: &RiskParams,
) -> Result<bool, MathError> {
    if params.min_profit_time_secs <= 0 || now.secs_since(opened_at) > params.min_profit_time_secs {
        return Ok(true);
    }

    let change = min_price_change.raw();
    let moved = match side {
        Side::Long => {
            let trigger = math::mul_div(entry_price.raw(), BPS_BASE + change, BPS_BASE)?;
            exit_price.raw() > trigger
        }
        Side::Short => {
            let trigger = math::mul_div(entry_price.raw(), BPS_BASE.saturating_sub(change), BPS_BASE)?;
            exit_price.raw() < trigger
        }
    };
    Ok(moved)
}
