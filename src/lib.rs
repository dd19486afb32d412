// vault-perps: perpetual futures where a single LP vault is the counterparty to every trade.
// solvency-first: utilization and exposure bounds are checked before anything commits.
// all computation is deterministic fixed point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, keys, fixed-point amounts, prices, leverage, time
//   1.5  math.rs: checked mul/div with floor rounding
//   2.x  vault.rs: LP shares, stakes, lock, cap
//   3.x  instrument.rs: instrument config + open interest
//   4.x  position.rs: position struct, size, PnL, merge
//   4.5  price_impact.rs: virtual-reserve slippage and skew shift
//   5.x  funding.rs: skew-driven funding index
//   6.x  liquidation.rs: threshold, net settlement, payout split
//   6.3  risk.rs: utilization, exposure, take-profit guard
//   6.5  fees.rs: trade fee, fee split, pending rewards
//   7.x  config.rs: exchange params, env presets
//   8.x  engine/: transactions, positions, vault, liquidations, admin
//   9.x  price_feed.rs: price source trait + mock
//   9.1  referral.rs: referral registry trait
//   9.2  conditional.rs: dependent close orders
//   10.x account.rs: trader/LP wallets
//   10.5 access.rs: roles
//   11.x events.rs: state transition events for audit

// core modules
pub mod account;
pub mod engine;
pub mod events;
pub mod funding;
pub mod instrument;
pub mod liquidation;
pub mod math;
pub mod position;
pub mod price_impact;
pub mod types;
pub mod vault;

// risk and accounting
pub mod access;
pub mod fees;
pub mod risk;

// integration modules
pub mod conditional;
pub mod config;
pub mod price_feed;
pub mod referral;

// re exports for convenience
pub use access::{AccessControl, Role};
pub use account::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use liquidation::*;
pub use position::*;
pub use risk::*;
pub use types::*;
pub use conditional::{CloseOrder, CANCELLATION_LOG_LIMIT, CloseOrderBook, CloseOrderManager, ConditionalOrderId, ConditionalType, NoCloseOrders};
pub use config::{ConfigError, Environment, ExchangeConfig};
pub use fees::{FeeParams, FeeSplit, PendingRewards};
pub use instrument::{Instrument, InstrumentConfig, InstrumentError};
pub use math::MathError;
pub use price_feed::{MockPriceFeed, PriceError, PriceSource};
pub use price_impact::{ImpactError, ImpactParams};
pub use referral::{NoReferrals, ReferralBook, ReferralError, ReferralRegistry, ReferrerInfo};
pub use vault::{Stake, Vault, VaultError, VaultParams};
