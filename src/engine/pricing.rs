//! Mark and execution prices.

use super::core::Engine;
use super::results::EngineError;
use crate::price_impact::{execution_price, ImpactInput};
use crate::risk;
use crate::types::{Amount, InstrumentId, Price};

impl Engine {
    /// Sum of every listed instrument's weight, active or not.
    pub(super) fn total_weight(&self) -> u64 {
        self.state
            .instruments
            .values()
            .fold(0u64, |acc, inst| acc.saturating_add(inst.config.weight))
    }

    /// Largest long/short imbalance the vault currently backs on `id`.
    pub fn max_exposure(&self, id: InstrumentId) -> Result<Amount, EngineError> {
        let instrument = self.instrument(id)?;
        Ok(risk::max_exposure(
            self.state.vault.balance,
            instrument.config.weight,
            self.total_weight(),
            &self.state.config.risk,
        )?)
    }

    /// Price source mark for a trade direction, no impact applied.
    pub fn mark_price(&self, id: InstrumentId, is_long: bool) -> Result<Price, EngineError> {
        Ok(self.collaborators.prices.price(id, is_long)?)
    }

    /// Mark adjusted by price impact. Reads open interest as it stands, so call it before
    /// the trade mutates OI.
    pub(super) fn execution_price(
        &self,
        id: InstrumentId,
        is_buy: bool,
        size: Amount,
    ) -> Result<Price, EngineError> {
        let mark_price = self.mark_price(id, is_buy)?;
        let instrument = self.instrument(id)?;
        let input = ImpactInput {
            mark_price,
            open_interest_long: instrument.open_interest_long,
            open_interest_short: instrument.open_interest_short,
            max_exposure: self.max_exposure(id)?,
            reserve_depth: instrument.config.reserve_depth,
            size,
        };
        Ok(execution_price(&input, is_buy, &self.state.config.impact)?)
    }

    /// Execution price a trade of `size` would get right now.
    pub fn quote_execution_price(
        &self,
        id: InstrumentId,
        is_buy: bool,
        size: Amount,
    ) -> Result<Price, EngineError> {
        self.execution_price(id, is_buy, size)
    }
}
