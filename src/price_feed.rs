// Price Feed Integration
//
// The engine never fetches prices itself. It asks a PriceSource for the mark of an
// instrument, optionally biased by trade direction, and the source decides whether that
// comes from Pyth, Chainlink or a test fixture. Oracle internals are not modeled here.

use crate::math;
use crate::types::{Bps, InstrumentId, Price, BPS_BASE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

/// Errors a price source may return. Any of them aborts the calling transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PriceError {
    #[error("no price for instrument {0:?}")]
    NotAvailable(InstrumentId),

    #[error("price for instrument {0:?} is stale")]
    Stale(InstrumentId),

    #[error("price source unhealthy: {0}")]
    Unhealthy(String),
}

/// Trait for price sources. `is_long` is the trade direction: true for a buy (opening a
/// long or closing a short), false for a sell. Sources without a spread ignore it.
pub trait PriceSource: Send + Sync + Debug {
    fn price(&self, instrument: InstrumentId, is_long: bool) -> Result<Price, PriceError>;
}

#[derive(Debug, Clone, Copy)]
struct FeedEntry {
    price: Price,
    healthy: bool,
}

/// Mock source for tests and the simulator. Interior mutability so a test can move the
/// price while the engine holds a shared handle.
#[derive(Debug, Default)]
pub struct MockPriceFeed {
    entries: RwLock<HashMap<InstrumentId, FeedEntry>>,
    /// Half-spread applied around the mark: buys pay up, sells receive less.
    spread: Bps,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spread(spread: Bps) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            spread,
        }
    }

    pub fn set_price(&self, instrument: InstrumentId, price: Price) {
        if let Ok(mut entries) = self.entries.write() {
            let entry = entries.entry(instrument).or_insert(FeedEntry {
                price,
                healthy: true,
            });
            entry.price = price;
        }
    }

    pub fn set_healthy(&self, instrument: InstrumentId, healthy: bool) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(&instrument) {
                entry.healthy = healthy;
            }
        }
    }

    pub fn remove(&self, instrument: InstrumentId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&instrument);
        }
    }
}

impl PriceSource for MockPriceFeed {
    fn price(&self, instrument: InstrumentId, is_long: bool) -> Result<Price, PriceError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PriceError::Unhealthy("feed lock poisoned".to_string()))?;
        let entry = entries
            .get(&instrument)
            .ok_or(PriceError::NotAvailable(instrument))?;
        if !entry.healthy {
            return Err(PriceError::Stale(instrument));
        }
        if self.spread == Bps::ZERO {
            return Ok(entry.price);
        }

        let factor = if is_long {
            BPS_BASE + self.spread.raw()
        } else {
            BPS_BASE.saturating_sub(self.spread.raw())
        };
        math::mul_div(entry.price.raw(), factor, BPS_BASE)
            .ok()
            .and_then(Price::new)
            .ok_or(PriceError::NotAvailable(instrument))
    }
}
