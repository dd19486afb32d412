// 8.0: vault-backed perps engine. owns the ledger and coordinates positions, funding,
// liquidations, the LP vault and fee routing. every mutation runs through one transaction.
// deterministic: time comes from the engine clock, prices from the injected source.

mod admin;
mod config;
mod core;
mod funding;
mod liquidations;
mod positions;
mod pricing;
mod results;
mod rewards;
mod vault;

pub use config::EngineConfig;
pub use core::{Collaborators, Engine, LedgerState};
pub use results::{
    CloseResult, EngineError, FundingSnapshot, LiquidationFailure, LiquidationReport,
    LiquidationResult, OpenResult, PositionHealth, ValidationError, WithdrawResult,
};
