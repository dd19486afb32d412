// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::instrument::InstrumentError;
use crate::math::MathError;
use crate::position::Position;
use crate::price_feed::PriceError;
use crate::price_impact::ImpactError;
use crate::referral::ReferralError;
use crate::risk::RiskViolation;
use crate::types::{
    AccountId, Amount, InstrumentId, Leverage, PositionKey, Price, Side, SignedAmount, Timestamp,
};
use crate::vault::VaultError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResult {
    pub key: PositionKey,
    pub execution_price: Price,
    pub size: Amount,
    pub fee: Amount,
    pub merged: bool,
    /// The slot after the open.
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseResult {
    pub key: PositionKey,
    pub execution_price: Price,
    pub margin_closed: Amount,
    pub size: Amount,
    pub pnl: SignedAmount,
    pub funding_cost: SignedAmount,
    pub net: SignedAmount,
    /// Fee routed to the fee split. zero when the loss wiped the margin.
    pub fee: Amount,
    pub payout: Amount,
    pub full_close: bool,
    pub profit_withheld: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    pub key: PositionKey,
    pub liquidator: AccountId,
    pub mark_price: Price,
    pub margin: Amount,
    pub net: SignedAmount,
    pub fee: Amount,
    pub liquidator_reward: Amount,
    pub vault_credit: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationFailure {
    pub key: PositionKey,
    pub error: EngineError,
}

/// Outcome of a batch. One key failing never rolls back another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationReport {
    pub liquidated: Vec<LiquidationResult>,
    /// Keys with no open position. benign.
    pub skipped: Vec<PositionKey>,
    pub failures: Vec<LiquidationFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawResult {
    pub shares: u128,
    pub paid: Amount,
    pub full: bool,
}

/// Keeper view of a position at the current mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHealth {
    pub key: PositionKey,
    pub mark_price: Price,
    pub margin: Amount,
    pub leverage: Leverage,
    pub pnl: SignedAmount,
    pub funding_cost: SignedAmount,
    pub net: SignedAmount,
    pub threshold_loss: Amount,
    pub liquidatable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSnapshot {
    pub instrument: InstrumentId,
    /// Annualized, scaled by FUNDING_BASE. positive charges longs.
    pub rate: i128,
    pub cumulative: i128,
    /// Index if accrual ran now.
    pub projected: i128,
    pub last_update: Option<Timestamp>,
}

/// Caller-correctable problems. The transaction aborts with no partial effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("instrument {0:?} not found")]
    InstrumentNotFound(InstrumentId),

    #[error("instrument {0:?} is not active")]
    InstrumentInactive(InstrumentId),

    #[error("instrument {0:?} already listed")]
    InstrumentAlreadyListed(InstrumentId),

    #[error("margin {margin} outside [{min}, {max})")]
    MarginOutOfRange { margin: Amount, min: Amount, max: Amount },

    #[error("leverage {leverage} outside [{min}, {max}]")]
    LeverageOutOfRange {
        leverage: Leverage,
        min: Leverage,
        max: Leverage,
    },

    #[error("account {account:?}: insufficient balance, requested {requested}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("position {0} not found")]
    PositionNotFound(PositionKey),

    #[error("no stake for {0:?}")]
    StakeNotFound(AccountId),

    #[error("stake locked until {unlocks_at:?}")]
    LockActive { unlocks_at: Timestamp },

    #[error("staking is disabled")]
    StakingDisabled,

    #[error("deposit of {amount} exceeds vault cap {cap} (staked {staked})")]
    VaultCapExceeded {
        amount: Amount,
        staked: Amount,
        cap: Amount,
    },

    #[error("vault has outstanding shares but zero balance")]
    VaultInsolvent,

    #[error("redeeming {requested} shares exceeds supply {total}")]
    SharesExceedSupply { requested: u128, total: u128 },

    #[error("trade of {size} exhausts reserve depth {reserve}")]
    TradeExceedsReserve { size: Amount, reserve: Amount },

    #[error("trading is paused")]
    TradingPaused,

    #[error("account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("account {0:?} already exists")]
    AccountExists(AccountId),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Exposure exceeded on {instrument:?} {side:?}: open interest {open_interest}, limit {limit}")]
    ExposureExceeded {
        instrument: InstrumentId,
        side: Side,
        open_interest: Amount,
        limit: Amount,
    },

    #[error("Utilization exceeded: open interest {open_interest}, limit {limit}")]
    UtilizationExceeded { open_interest: Amount, limit: Amount },

    #[error("Vault balance {balance} cannot cover {required}")]
    InsufficientVaultBalance { required: Amount, balance: Amount },

    #[error("Position {0} is not liquidatable")]
    NotLiquidatable(PositionKey),

    #[error("{caller:?} is not authorized to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("Price source error: {0}")]
    Price(#[from] PriceError),

    #[error("Referral registry error: {0}")]
    Referral(#[from] ReferralError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Engine is already inside a transaction")]
    Reentrant,
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientBalance {
                account,
                requested,
                available,
            } => ValidationError::InsufficientBalance {
                account,
                requested,
                available,
            }
            .into(),
            AccountError::NotFound(id) => ValidationError::AccountNotFound(id).into(),
            AccountError::AlreadyExists(id) => ValidationError::AccountExists(id).into(),
            AccountError::Overflow => MathError::Overflow.into(),
        }
    }
}

impl From<VaultError> for EngineError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::ZeroAmount => ValidationError::ZeroAmount.into(),
            VaultError::CapExceeded { amount, staked, cap } => {
                ValidationError::VaultCapExceeded { amount, staked, cap }.into()
            }
            VaultError::Insolvent => ValidationError::VaultInsolvent.into(),
            VaultError::SharesExceedSupply { requested, total } => {
                ValidationError::SharesExceedSupply { requested, total }.into()
            }
            VaultError::StakeNotFound(owner) => ValidationError::StakeNotFound(owner).into(),
            VaultError::LockActive { unlocks_at } => ValidationError::LockActive { unlocks_at }.into(),
            VaultError::InsufficientBalance { requested, balance } => {
                EngineError::InsufficientVaultBalance {
                    required: requested,
                    balance,
                }
            }
            VaultError::Math(e) => e.into(),
        }
    }
}

impl From<InstrumentError> for EngineError {
    fn from(err: InstrumentError) -> Self {
        let validation = match err {
            InstrumentError::NotFound(id) => ValidationError::InstrumentNotFound(id),
            InstrumentError::NotActive(id) => ValidationError::InstrumentInactive(id),
            InstrumentError::AlreadyListed(id) => ValidationError::InstrumentAlreadyListed(id),
            InstrumentError::LeverageOutOfRange { leverage, min, max } => {
                ValidationError::LeverageOutOfRange { leverage, min, max }
            }
            InstrumentError::InvalidConfig(reason) => ValidationError::InvalidConfig(reason),
        };
        validation.into()
    }
}

impl From<ImpactError> for EngineError {
    fn from(err: ImpactError) -> Self {
        match err {
            ImpactError::ExceedsReserve { size, reserve } => {
                ValidationError::TradeExceedsReserve { size, reserve }.into()
            }
            ImpactError::NonPositivePrice => MathError::Underflow.into(),
            ImpactError::Math(e) => e.into(),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        ValidationError::InvalidConfig(err.to_string()).into()
    }
}

impl From<RiskViolation> for EngineError {
    fn from(violation: RiskViolation) -> Self {
        match violation {
            RiskViolation::Exposure {
                instrument,
                side,
                open_interest,
                limit,
            } => EngineError::ExposureExceeded {
                instrument,
                side,
                open_interest,
                limit,
            },
            RiskViolation::Utilization { open_interest, limit } => {
                EngineError::UtilizationExceeded { open_interest, limit }
            }
        }
    }
}
