//! Position lifecycle: open, add margin, close.

use super::core::Engine;
use super::results::{CloseResult, EngineError, OpenResult, ValidationError};
use crate::events::{
    CloseReason, EventPayload, MarginAddedEvent, OiUpdatedEvent, PositionClosedEvent,
    PositionOpenedEvent,
};
use crate::fees::calculate_trade_fee;
use crate::funding::calculate_funding_cost;
use crate::liquidation::net_settlement;
use crate::math::{self, MathError};
use crate::position::{calculate_pnl, leverage_after_margin, merge_position, size_of, Position};
use crate::risk;
use crate::types::{AccountId, Amount, InstrumentId, Leverage, PositionKey, Side, SignedAmount};

impl Engine {
    /// Opens a position, or adds a leg to the one already in the slot.
    pub fn open_position(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        instrument: InstrumentId,
        side: Side,
        margin: Amount,
        leverage: Leverage,
    ) -> Result<OpenResult, EngineError> {
        self.transact("open_position", |engine| {
            engine.open_in_tx(caller, owner, instrument, side, margin, leverage)
        })
    }

    fn open_in_tx(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        instrument_id: InstrumentId,
        side: Side,
        margin: Amount,
        leverage: Leverage,
    ) -> Result<OpenResult, EngineError> {
        self.require_owner_or_manager(caller, owner, "open positions")?;
        self.require_trading()?;

        let instrument = self.instrument(instrument_id)?;
        if !instrument.is_active() {
            return Err(ValidationError::InstrumentInactive(instrument_id).into());
        }
        instrument.config.check_leverage(leverage)?;
        let fee_rate = instrument.config.fee_rate;

        let risk = &self.state.config.risk;
        if margin < risk.min_margin || margin >= risk.max_margin {
            return Err(ValidationError::MarginOutOfRange {
                margin,
                min: risk.min_margin,
                max: risk.max_margin,
            }
            .into());
        }

        let size = size_of(margin, leverage)?;
        let fee = calculate_trade_fee(size, fee_rate)?;
        let collected = margin.checked_add(fee).ok_or(MathError::Overflow)?;
        self.debit_wallet(owner, collected)?;
        self.distribute_fee(owner, fee)?;

        // pre-trade OI drives both impact and the funding accrual
        let execution_price = self.execution_price(instrument_id, side.is_long(), size)?;
        let cumulative = self.advance_funding(instrument_id)?;
        self.increase_open_interest(instrument_id, side, size)?;

        let key = PositionKey::new(owner, instrument_id, side);
        let now = self.current_time;
        let (position, merged) = match self.state.positions.get(&key) {
            Some(existing) => (
                merge_position(existing, margin, leverage, execution_price, cumulative, now)?,
                true,
            ),
            None => (
                Position {
                    owner,
                    instrument: instrument_id,
                    side,
                    margin,
                    leverage,
                    entry_price: execution_price,
                    entry_funding: cumulative,
                    timestamp: now,
                },
                false,
            ),
        };
        self.state.positions.insert(key, position.clone());
        self.instrument_mut(instrument_id)?.record_volume(size);

        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            key,
            margin,
            leverage,
            size,
            execution_price,
            fee,
            merged,
            total_margin: position.margin,
            average_price: position.entry_price,
            average_leverage: position.leverage,
        }));

        Ok(OpenResult {
            key,
            execution_price,
            size,
            fee,
            merged,
            position,
        })
    }

    /// Tops up margin. Size is unchanged, so leverage falls.
    pub fn add_margin(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        instrument: InstrumentId,
        side: Side,
        amount: Amount,
    ) -> Result<Position, EngineError> {
        self.transact("add_margin", |engine| {
            engine.require_owner_or_manager(caller, owner, "add margin")?;
            engine.require_trading()?;

            let risk = &engine.state.config.risk;
            if amount < risk.min_margin {
                return Err(ValidationError::MarginOutOfRange {
                    margin: amount,
                    min: risk.min_margin,
                    max: risk.max_margin,
                }
                .into());
            }

            let key = PositionKey::new(owner, instrument, side);
            let position = engine
                .state
                .positions
                .get(&key)
                .cloned()
                .ok_or(ValidationError::PositionNotFound(key))?;
            let config = &engine.instrument(instrument)?.config;
            let (min, max) = (config.min_leverage, config.max_leverage);

            let new_margin = position.margin.checked_add(amount).ok_or(MathError::Overflow)?;
            // a zero result rounds away entirely; report it against the floor
            let new_leverage =
                match leverage_after_margin(position.leverage, position.margin, new_margin)? {
                    Some(leverage) if leverage >= min => leverage,
                    Some(leverage) => {
                        return Err(ValidationError::LeverageOutOfRange { leverage, min, max }.into())
                    }
                    None => {
                        return Err(ValidationError::LeverageOutOfRange {
                            leverage: min,
                            min,
                            max,
                        }
                        .into())
                    }
                };

            engine.debit_wallet(owner, amount)?;
            let updated = Position {
                margin: new_margin,
                leverage: new_leverage,
                ..position
            };
            engine.state.positions.insert(key, updated.clone());

            engine.emit_event(EventPayload::MarginAdded(MarginAddedEvent {
                key,
                amount,
                new_margin,
                new_leverage,
            }));
            Ok(updated)
        })
    }

    /// Closes `margin` worth of a position; anything above the open margin closes it all.
    /// Closing an empty slot is a no-op that still advances the instrument's funding.
    pub fn close_position(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        instrument: InstrumentId,
        side: Side,
        margin: Amount,
    ) -> Result<Option<CloseResult>, EngineError> {
        self.transact("close_position", |engine| {
            engine.close_in_tx(caller, owner, instrument, side, margin)
        })
    }

    fn close_in_tx(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        instrument_id: InstrumentId,
        side: Side,
        margin: Amount,
    ) -> Result<Option<CloseResult>, EngineError> {
        self.require_owner_or_manager(caller, owner, "close positions")?;
        self.require_trading()?;
        if margin.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        self.instrument(instrument_id)?;

        let key = PositionKey::new(owner, instrument_id, side);
        let Some(position) = self.state.positions.get(&key).cloned() else {
            self.advance_funding(instrument_id)?;
            return Ok(None);
        };

        let margin_closed = margin.min(position.margin);
        let full_close = margin_closed == position.margin;
        let size = position.size_for_margin(margin_closed)?;

        let execution_price = self.execution_price(instrument_id, !side.is_long(), size)?;
        let cumulative = self.advance_funding(instrument_id)?;
        let funding_cost = calculate_funding_cost(side, size, position.entry_funding, cumulative)?;
        let pnl = calculate_pnl(
            side,
            position.entry_price,
            position.leverage,
            margin_closed,
            execution_price,
        )?;
        let mut net = net_settlement(pnl, funding_cost)?;

        let config = &self.instrument(instrument_id)?.config;
        let (fee_rate, min_price_change) = (config.fee_rate, config.min_price_change);

        let mut profit_withheld = false;
        if net.raw() > 0
            && !risk::can_take_profit(
                side,
                position.entry_price,
                position.timestamp,
                execution_price,
                min_price_change,
                self.current_time,
                &self.state.config.risk,
            )?
        {
            net = SignedAmount::ZERO;
            profit_withheld = true;
        }

        let trade_fee = calculate_trade_fee(size, fee_rate)?;
        let (payout, fee) = self.settle_close(owner, margin_closed, net, trade_fee)?;

        self.decrease_open_interest(instrument_id, side, size)?;
        self.instrument_mut(instrument_id)?.record_volume(size);
        // a payout shrinks every instrument's backing, and closing the lighter side widens
        // the skew. either can leave the book over its limits
        self.check_book_limits()?;

        if full_close {
            self.state.positions.remove(&key);
            self.defer_cancel(key);
        } else if let Some(open) = self.state.positions.get_mut(&key) {
            open.margin = open.margin.saturating_sub(margin_closed);
        }

        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            key,
            margin_closed,
            size,
            execution_price,
            pnl,
            funding_cost,
            net,
            fee,
            payout,
            full_close,
            profit_withheld,
            close_reason: CloseReason::UserClosed,
        }));

        Ok(Some(CloseResult {
            key,
            execution_price,
            margin_closed,
            size,
            pnl,
            funding_cost,
            net,
            fee,
            payout,
            full_close,
            profit_withheld,
        }))
    }

    // returns (payout to owner, fee routed to the split)
    fn settle_close(
        &mut self,
        owner: AccountId,
        margin: Amount,
        net: SignedAmount,
        fee: Amount,
    ) -> Result<(Amount, Amount), EngineError> {
        let after_fee = net
            .raw()
            .checked_sub(math::to_signed(fee.raw())?)
            .ok_or(MathError::Overflow)?;

        if after_fee < 0 {
            let loss = Amount::new(after_fee.unsigned_abs());
            if loss >= margin {
                // wiped: the vault keeps everything and no fee is split out
                self.state.vault.credit(margin)?;
                return Ok((Amount::ZERO, Amount::ZERO));
            }
            let payout = margin.saturating_sub(loss);
            self.state.vault.credit(loss)?;
            self.state.vault.debit(fee)?;
            self.credit_wallet(owner, payout)?;
            self.distribute_fee(owner, fee)?;
            return Ok((payout, fee));
        }

        let profit = Amount::new(after_fee.unsigned_abs());
        let required = profit.checked_add(fee).ok_or(MathError::Overflow)?;
        let balance = self.state.vault.balance;
        if balance < required {
            return Err(EngineError::InsufficientVaultBalance { required, balance });
        }
        self.state.vault.debit(required)?;
        let payout = margin.checked_add(profit).ok_or(MathError::Overflow)?;
        self.credit_wallet(owner, payout)?;
        self.distribute_fee(owner, fee)?;
        Ok((payout, fee))
    }

    pub(super) fn require_trading(&self) -> Result<(), EngineError> {
        if self.state.config.trading_paused {
            return Err(ValidationError::TradingPaused.into());
        }
        Ok(())
    }

    pub(super) fn check_utilization(&self) -> Result<(), EngineError> {
        risk::check_utilization(
            self.state.total_open_interest,
            self.state.vault.balance,
            &self.state.config.risk,
        )??;
        Ok(())
    }

    /// Utilization, then the exposure bound on both sides of every listed instrument.
    /// Run before commit by anything that moves open interest, the vault balance or the
    /// weights behind `max_exposure`.
    pub(super) fn check_book_limits(&self) -> Result<(), EngineError> {
        self.check_utilization()?;
        for (&id, instrument) in &self.state.instruments {
            let max_exposure = self.max_exposure(id)?;
            for side in [Side::Long, Side::Short] {
                risk::check_exposure(
                    id,
                    side,
                    instrument.open_interest(side),
                    instrument.open_interest(side.opposite()),
                    max_exposure,
                )??;
            }
        }
        Ok(())
    }

    // both limits are checked against the post-trade book
    fn increase_open_interest(
        &mut self,
        id: InstrumentId,
        side: Side,
        size: Amount,
    ) -> Result<(), EngineError> {
        let instrument = self.instrument_mut(id)?;
        let side_oi = instrument
            .increase_open_interest(side, size)
            .ok_or(MathError::Overflow)?;
        let other_oi = instrument.open_interest(side.opposite());
        self.state.total_open_interest = self
            .state
            .total_open_interest
            .checked_add(size)
            .ok_or(MathError::Overflow)?;

        let max_exposure = self.max_exposure(id)?;
        risk::check_exposure(id, side, side_oi, other_oi, max_exposure)??;
        self.check_utilization()?;

        self.emit_oi_updated(id)
    }

    pub(super) fn decrease_open_interest(
        &mut self,
        id: InstrumentId,
        side: Side,
        size: Amount,
    ) -> Result<(), EngineError> {
        self.instrument_mut(id)?.decrease_open_interest(side, size);
        self.state.total_open_interest = self.state.total_open_interest.saturating_sub(size);
        self.emit_oi_updated(id)
    }

    fn emit_oi_updated(&mut self, id: InstrumentId) -> Result<(), EngineError> {
        let instrument = self.instrument(id)?;
        let event = OiUpdatedEvent {
            instrument: id,
            long_oi: instrument.open_interest_long,
            short_oi: instrument.open_interest_short,
            total_oi: self.state.total_open_interest,
        };
        self.emit_event(EventPayload::OiUpdated(event));
        Ok(())
    }
}
