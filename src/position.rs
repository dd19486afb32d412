// 4.0: open position tracking. pnl = margin * leverage * (exit - entry) / entry.
// 4.1 has the merge logic for adding to an open slot at the bottom.

use crate::math::{self, MathError};
use crate::types::{
    AccountId, Amount, InstrumentId, Leverage, Price, PositionKey, Side, SignedAmount, Timestamp,
    BASE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub owner: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub margin: Amount,
    pub leverage: Leverage,
    pub entry_price: Price,
    /// Cumulative funding index when the position was opened (size-weighted after merges).
    pub entry_funding: i128,
    pub timestamp: Timestamp,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.owner, self.instrument, self.side)
    }

    pub fn is_long(&self) -> bool {
        self.side.is_long()
    }

    /// Notional size: `margin * leverage / BASE`.
    pub fn size(&self) -> Result<Amount, MathError> {
        size_of(self.margin, self.leverage)
    }

    /// Size of the slice that closes when `margin` of it is released.
    pub fn size_for_margin(&self, margin: Amount) -> Result<Amount, MathError> {
        size_of(margin, self.leverage)
    }

    // merge weight. kept at full precision (BASE^2) so averages don't lose digits
    fn weight(&self) -> Result<u128, MathError> {
        math::mul(self.margin.raw(), self.leverage.raw())
    }
}

pub fn size_of(margin: Amount, leverage: Leverage) -> Result<Amount, MathError> {
    math::mul_div(margin.raw(), leverage.raw(), BASE).map(Amount::new)
}

// 4.2: price pnl of `margin` worth of the position closed at `exit_price`.
// long gains when exit > entry, short mirrors. funding is not included here.
pub fn calculate_pnl(
    side: Side,
    entry_price: Price,
    leverage: Leverage,
    margin: Amount,
    exit_price: Price,
) -> Result<SignedAmount, MathError> {
    let (diff, price_rose) = if exit_price >= entry_price {
        (exit_price.raw() - entry_price.raw(), true)
    } else {
        (entry_price.raw() - exit_price.raw(), false)
    };

    let magnitude = math::mul(math::mul(margin.raw(), leverage.raw())?, diff)?
        / entry_price.raw()
        / BASE;
    let magnitude = math::to_signed(magnitude)?;

    let gains = price_rose == side.is_long();
    Ok(SignedAmount::new(if gains { magnitude } else { -magnitude }))
}

// 4.3: adds a leg to an open slot. price, funding and leverage are averaged by
// margin * leverage; margin is the sum. the timestamp moves to the new leg.
pub fn merge_position(
    position: &Position,
    margin: Amount,
    leverage: Leverage,
    price: Price,
    funding_index: i128,
    timestamp: Timestamp,
) -> Result<Position, MathError> {
    let old_weight = position.weight()?;
    let new_weight = math::mul(margin.raw(), leverage.raw())?;

    let entry_price = math::weighted_average(
        position.entry_price.raw(),
        old_weight,
        price.raw(),
        new_weight,
    )?;
    let entry_funding =
        math::weighted_average_signed(position.entry_funding, old_weight, funding_index, new_weight)?;

    let total_margin = math::add(position.margin.raw(), margin.raw())?;
    let merged_leverage = math::add(old_weight, new_weight)? / total_margin.max(1);

    Ok(Position {
        owner: position.owner,
        instrument: position.instrument,
        side: position.side,
        margin: Amount::new(total_margin),
        leverage: Leverage::new(merged_leverage).ok_or(MathError::Underflow)?,
        entry_price: Price::new(entry_price).ok_or(MathError::Underflow)?,
        entry_funding,
        timestamp,
    })
}

// 4.4: leverage after topping up margin. notional stays put, so leverage shrinks.
pub fn leverage_after_margin(
    leverage: Leverage,
    old_margin: Amount,
    new_margin: Amount,
) -> Result<Option<Leverage>, MathError> {
    let raw = math::mul_div(leverage.raw(), old_margin.raw(), new_margin.raw())?;
    Ok(Leverage::new(raw))
}
