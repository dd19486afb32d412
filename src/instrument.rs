//! Instrument configuration and state.
//!
//! An instrument is one tradable market quoted against the vault: its leverage band, fee
//! rate, exposure weight, virtual reserve for price impact, open interest on both sides and
//! its funding index.

use crate::funding::FundingState;
use crate::types::{Amount, Bps, InstrumentId, Leverage, Side, Timestamp, FUNDING_BASE};
use serde::{Deserialize, Serialize};

/// Admin-controlled instrument parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: InstrumentId,
    /// Human-readable name (e.g., "BTC-USD")
    pub name: String,
    pub active: bool,
    pub min_leverage: Leverage,
    pub max_leverage: Leverage,
    /// Trade fee on notional size.
    pub fee_rate: Bps,
    /// Share of vault exposure allotted to this instrument, relative to all listed weights.
    pub weight: u64,
    /// Virtual reserve for the depth term of price impact. zero disables impact.
    pub reserve_depth: Amount,
    /// Favorable move that lets a young position take profit early.
    pub min_price_change: Bps,
    /// Annualized funding at full skew, scaled by FUNDING_BASE.
    pub funding_multiplier: i128,
}

impl InstrumentConfig {
    pub fn btc_usd() -> Self {
        Self {
            id: InstrumentId(1),
            name: "BTC-USD".to_string(),
            active: true,
            min_leverage: Leverage::ONE,
            max_leverage: Leverage::from_whole(100),
            fee_rate: Bps::new(10), // 0.1%
            weight: 1,
            reserve_depth: Amount::from_units(100_000_000),
            min_price_change: Bps::new(100),
            funding_multiplier: FUNDING_BASE,
        }
    }

    pub fn eth_usd() -> Self {
        Self {
            id: InstrumentId(2),
            name: "ETH-USD".to_string(),
            max_leverage: Leverage::from_whole(50),
            reserve_depth: Amount::from_units(50_000_000),
            ..Self::btc_usd()
        }
    }

    pub fn validate(&self) -> Result<(), InstrumentError> {
        if self.min_leverage > self.max_leverage {
            return Err(InstrumentError::InvalidConfig(format!(
                "{}: min leverage {} above max {}",
                self.name, self.min_leverage, self.max_leverage
            )));
        }
        if self.fee_rate >= Bps::FULL {
            return Err(InstrumentError::InvalidConfig(format!(
                "{}: fee rate must be below 100%",
                self.name
            )));
        }
        if self.min_price_change >= Bps::FULL {
            return Err(InstrumentError::InvalidConfig(format!(
                "{}: min price change must be below 100%",
                self.name
            )));
        }
        if self.funding_multiplier < 0 {
            return Err(InstrumentError::InvalidConfig(format!(
                "{}: negative funding multiplier",
                self.name
            )));
        }
        Ok(())
    }

    pub fn check_leverage(&self, leverage: Leverage) -> Result<(), InstrumentError> {
        if leverage < self.min_leverage || leverage > self.max_leverage {
            return Err(InstrumentError::LeverageOutOfRange {
                leverage,
                min: self.min_leverage,
                max: self.max_leverage,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub config: InstrumentConfig,
    pub open_interest_long: Amount,
    pub open_interest_short: Amount,
    pub funding: FundingState,
    /// Cumulative notional traded, opens and closes.
    pub volume: Amount,
    pub listed_at: Timestamp,
}

impl Instrument {
    pub fn new(config: InstrumentConfig, timestamp: Timestamp) -> Self {
        let funding = FundingState::new(config.funding_multiplier);
        Self {
            config,
            open_interest_long: Amount::ZERO,
            open_interest_short: Amount::ZERO,
            funding,
            volume: Amount::ZERO,
            listed_at: timestamp,
        }
    }

    pub fn id(&self) -> InstrumentId {
        self.config.id
    }

    pub fn is_active(&self) -> bool {
        self.config.active
    }

    pub fn open_interest(&self, side: Side) -> Amount {
        match side {
            Side::Long => self.open_interest_long,
            Side::Short => self.open_interest_short,
        }
    }

    pub fn increase_open_interest(&mut self, side: Side, amount: Amount) -> Option<Amount> {
        let slot = match side {
            Side::Long => &mut self.open_interest_long,
            Side::Short => &mut self.open_interest_short,
        };
        *slot = slot.checked_add(amount)?;
        Some(*slot)
    }

    // saturating: merged positions can round their size below the OI they added
    pub fn decrease_open_interest(&mut self, side: Side, amount: Amount) -> Amount {
        let slot = match side {
            Side::Long => &mut self.open_interest_long,
            Side::Short => &mut self.open_interest_short,
        };
        *slot = slot.saturating_sub(amount);
        *slot
    }

    pub fn record_volume(&mut self, size: Amount) {
        self.volume = Amount::new(self.volume.raw().saturating_add(size.raw()));
    }

    /// Applies new parameters while keeping OI and the funding index.
    pub fn reconfigure(&mut self, config: InstrumentConfig) {
        self.funding.multiplier = config.funding_multiplier;
        self.config = config;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("instrument {0:?} not found")]
    NotFound(InstrumentId),

    #[error("instrument {0:?} is not active")]
    NotActive(InstrumentId),

    #[error("instrument {0:?} already listed")]
    AlreadyListed(InstrumentId),

    #[error("leverage {leverage} outside [{min}, {max}]")]
    LeverageOutOfRange {
        leverage: Leverage,
        min: Leverage,
        max: Leverage,
    },

    #[error("invalid instrument config: {0}")]
    InvalidConfig(String),
}
