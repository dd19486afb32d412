//! Funding accrual.

use super::core::Engine;
use super::results::{EngineError, FundingSnapshot};
use crate::events::{EventPayload, FundingUpdatedEvent};
use crate::funding::calculate_funding_rate;
use crate::types::InstrumentId;

impl Engine {
    /// Current annualized rate from open interest as it stands.
    pub fn funding_rate(&self, id: InstrumentId) -> Result<i128, EngineError> {
        let instrument = self.instrument(id)?;
        Ok(calculate_funding_rate(
            instrument.open_interest_long,
            instrument.open_interest_short,
            instrument.funding.multiplier,
            self.max_exposure(id)?,
            &self.state.config.funding,
        )?)
    }

    /// Brings the instrument's index up to the engine clock and returns it. Runs once per
    /// instrument per trade call, before that call mutates open interest.
    pub(super) fn advance_funding(&mut self, id: InstrumentId) -> Result<i128, EngineError> {
        let rate = self.funding_rate(id)?;
        let now = self.current_time;
        let instrument = self.instrument_mut(id)?;
        let accrued = instrument.funding.accrue(rate, now)?;
        let cumulative = instrument.funding.cumulative;

        self.emit_event(EventPayload::FundingUpdated(FundingUpdatedEvent {
            instrument: id,
            rate,
            accrued: accrued.unwrap_or(0),
            cumulative,
        }));
        Ok(cumulative)
    }

    /// Index value if accrual ran now, without mutating anything.
    pub fn projected_funding_index(&self, id: InstrumentId) -> Result<i128, EngineError> {
        let rate = self.funding_rate(id)?;
        Ok(self.instrument(id)?.funding.preview(rate, self.current_time)?)
    }

    pub fn funding_snapshot(&self, id: InstrumentId) -> Result<FundingSnapshot, EngineError> {
        let instrument = self.instrument(id)?;
        Ok(FundingSnapshot {
            instrument: id,
            rate: self.funding_rate(id)?,
            cumulative: instrument.funding.cumulative,
            projected: self.projected_funding_index(id)?,
            last_update: instrument.funding.last_update,
        })
    }
}
