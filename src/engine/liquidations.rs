//! Liquidation detection and execution.

use super::core::Engine;
use super::results::{
    EngineError, LiquidationFailure, LiquidationReport, LiquidationResult, PositionHealth,
    ValidationError,
};
use crate::events::{EventPayload, LiquidationEvent};
use crate::fees::calculate_trade_fee;
use crate::funding::calculate_funding_cost;
use crate::liquidation::{
    calculate_liquidation_payout, evaluate_liquidation, net_settlement, threshold_loss,
};
use crate::position::{calculate_pnl, Position};
use crate::types::{AccountId, Amount, PositionKey, Price, SignedAmount};

struct Valuation {
    mark_price: Price,
    size: Amount,
    pnl: SignedAmount,
    funding_cost: SignedAmount,
    net: SignedAmount,
}

impl Engine {
    /// Liquidates each key in its own transaction. A failing key never undoes another.
    pub fn liquidate_positions(
        &mut self,
        caller: AccountId,
        keys: &[PositionKey],
    ) -> Result<LiquidationReport, EngineError> {
        if !self.state.access.can_liquidate(caller) {
            let err = EngineError::Unauthorized {
                caller,
                action: "liquidate positions",
            };
            self.reject("liquidate_positions", &err);
            return Err(err);
        }

        let mut report = LiquidationReport::default();
        for &key in keys {
            match self.transact("liquidate_position", |engine| engine.liquidate_in_tx(caller, key)) {
                Ok(Some(result)) => report.liquidated.push(result),
                Ok(None) => report.skipped.push(key),
                Err(error) => report.failures.push(LiquidationFailure { key, error }),
            }
        }

        tracing::info!(
            liquidated = report.liquidated.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "liquidation batch done"
        );
        Ok(report)
    }

    /// Single-key entry point. `Ok(None)` means the slot was already empty.
    pub fn liquidate_position(
        &mut self,
        caller: AccountId,
        key: PositionKey,
    ) -> Result<Option<LiquidationResult>, EngineError> {
        self.transact("liquidate_position", |engine| {
            if !engine.state.access.can_liquidate(caller) {
                return Err(EngineError::Unauthorized {
                    caller,
                    action: "liquidate positions",
                });
            }
            engine.liquidate_in_tx(caller, key)
        })
    }

    fn liquidate_in_tx(
        &mut self,
        liquidator: AccountId,
        key: PositionKey,
    ) -> Result<Option<LiquidationResult>, EngineError> {
        let Some(position) = self.state.positions.get(&key).cloned() else {
            return Ok(None);
        };

        let cumulative = self.advance_funding(key.instrument)?;
        let valuation = self.value_at_mark(&position, cumulative)?;
        let params = self.state.config.liquidation.clone();
        if !evaluate_liquidation(valuation.net, position.margin, &params)?.is_liquidatable() {
            return Err(EngineError::NotLiquidatable(key));
        }

        let fee_rate = self.instrument(key.instrument)?.config.fee_rate;
        let trade_fee = calculate_trade_fee(valuation.size, fee_rate)?;
        let payout = calculate_liquidation_payout(position.margin, trade_fee, &params)?;

        self.distribute_fee(position.owner, payout.fee)?;
        if !payout.liquidator_reward.is_zero() {
            self.credit_wallet(liquidator, payout.liquidator_reward)?;
        }
        self.state.vault.credit(payout.vault_credit)?;

        self.decrease_open_interest(key.instrument, key.side, valuation.size)?;
        self.instrument_mut(key.instrument)?.record_volume(valuation.size);
        self.state.positions.remove(&key);
        // removing the lighter side can push the skew past the bound; the position waits
        // until the heavier side shrinks. its loss is capped at margin so waiting costs the
        // vault nothing
        self.check_book_limits()?;
        self.defer_cancel(key);

        tracing::info!(
            %key,
            liquidator = liquidator.0,
            mark = %valuation.mark_price,
            net = %valuation.net,
            reward = %payout.liquidator_reward,
            "position liquidated"
        );

        let result = LiquidationResult {
            key,
            liquidator,
            mark_price: valuation.mark_price,
            margin: position.margin,
            net: valuation.net,
            fee: payout.fee,
            liquidator_reward: payout.liquidator_reward,
            vault_credit: payout.vault_credit,
        };
        self.emit_event(EventPayload::Liquidation(LiquidationEvent {
            key: result.key,
            liquidator: result.liquidator,
            mark_price: result.mark_price,
            margin: result.margin,
            net: result.net,
            fee: result.fee,
            liquidator_reward: result.liquidator_reward,
            vault_credit: result.vault_credit,
        }));
        Ok(Some(result))
    }

    // closing side's mark, no impact
    fn value_at_mark(&self, position: &Position, cumulative: i128) -> Result<Valuation, EngineError> {
        let mark_price = self.mark_price(position.instrument, !position.side.is_long())?;
        let size = position.size()?;
        let funding_cost =
            calculate_funding_cost(position.side, size, position.entry_funding, cumulative)?;
        let pnl = calculate_pnl(
            position.side,
            position.entry_price,
            position.leverage,
            position.margin,
            mark_price,
        )?;
        let net = net_settlement(pnl, funding_cost)?;
        Ok(Valuation {
            mark_price,
            size,
            pnl,
            funding_cost,
            net,
        })
    }

    /// Read-only valuation against the projected funding index.
    pub fn position_health(&self, key: PositionKey) -> Result<PositionHealth, EngineError> {
        let position = self
            .state
            .positions
            .get(&key)
            .ok_or(ValidationError::PositionNotFound(key))?;
        let cumulative = self.projected_funding_index(key.instrument)?;
        let valuation = self.value_at_mark(position, cumulative)?;
        let params = &self.state.config.liquidation;

        Ok(PositionHealth {
            key,
            mark_price: valuation.mark_price,
            margin: position.margin,
            leverage: position.leverage,
            pnl: valuation.pnl,
            funding_cost: valuation.funding_cost,
            net: valuation.net,
            threshold_loss: threshold_loss(position.margin, params)?,
            liquidatable: evaluate_liquidation(valuation.net, position.margin, params)?
                .is_liquidatable(),
        })
    }

    /// Keys a keeper could liquidate right now. Keys that can't be valued, e.g. for want
    /// of a price, are left out of the scan.
    pub fn liquidatable_positions(&self) -> Result<Vec<PositionKey>, EngineError> {
        let mut keys = Vec::new();
        for key in self.state.positions.keys() {
            match self.position_health(*key) {
                Ok(health) if health.liquidatable => keys.push(*key),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(%key, %error, "skipping position that can't be valued");
                }
            }
        }
        Ok(keys)
    }
}
