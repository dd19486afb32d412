// 11.0: every committed state change produces an event, and every rejected operation
// produces exactly one OperationRejected. used for audit trails and for notifying
// keepers and indexers. the EventPayload enum lists all event types.

use crate::access::Role;
use crate::types::{
    AccountId, Amount, InstrumentId, Leverage, PositionKey, Price, SignedAmount, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Wallet events
    AccountCreated { account: AccountId },
    CollateralDeposited(WalletEvent),
    CollateralWithdrawn(WalletEvent),

    // Vault events
    VaultDeposit(VaultDepositEvent),
    VaultWithdrawal(VaultWithdrawalEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    MarginAdded(MarginAddedEvent),
    PositionClosed(PositionClosedEvent),
    Liquidation(LiquidationEvent),

    // Market data events
    FundingUpdated(FundingUpdatedEvent),
    OiUpdated(OiUpdatedEvent),

    // Fee and reward events
    FeeDistributed(FeeDistributedEvent),
    RewardPulled {
        pool: RewardPool,
        router: AccountId,
        amount: Amount,
    },
    RebateClaimed { account: AccountId, amount: Amount },

    // Admin events
    InstrumentListed { instrument: InstrumentId, name: String },
    InstrumentUpdated { instrument: InstrumentId, active: bool },
    ConfigUpdated,
    TradingPaused { paused: bool },
    StakingEnabled { enabled: bool },
    VaultLimitsUpdated { cap: Amount, min_lock_duration_secs: i64 },
    RoleGranted { role: Role, account: AccountId },
    RoleRevoked { role: Role, account: AccountId },
    PublicLiquidation { enabled: bool },

    // Rejections
    OperationRejected { operation: String, reason: String },
}

impl EventPayload {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::AccountCreated { .. } => "account_created",
            EventPayload::CollateralDeposited(_) => "collateral_deposited",
            EventPayload::CollateralWithdrawn(_) => "collateral_withdrawn",
            EventPayload::VaultDeposit(_) => "vault_deposit",
            EventPayload::VaultWithdrawal(_) => "vault_withdrawal",
            EventPayload::PositionOpened(_) => "position_opened",
            EventPayload::MarginAdded(_) => "margin_added",
            EventPayload::PositionClosed(_) => "position_closed",
            EventPayload::Liquidation(_) => "liquidation",
            EventPayload::FundingUpdated(_) => "funding_updated",
            EventPayload::OiUpdated(_) => "oi_updated",
            EventPayload::FeeDistributed(_) => "fee_distributed",
            EventPayload::RewardPulled { .. } => "reward_pulled",
            EventPayload::RebateClaimed { .. } => "rebate_claimed",
            EventPayload::InstrumentListed { .. } => "instrument_listed",
            EventPayload::InstrumentUpdated { .. } => "instrument_updated",
            EventPayload::ConfigUpdated => "config_updated",
            EventPayload::TradingPaused { .. } => "trading_paused",
            EventPayload::StakingEnabled { .. } => "staking_enabled",
            EventPayload::VaultLimitsUpdated { .. } => "vault_limits_updated",
            EventPayload::RoleGranted { .. } => "role_granted",
            EventPayload::RoleRevoked { .. } => "role_revoked",
            EventPayload::PublicLiquidation { .. } => "public_liquidation",
            EventPayload::OperationRejected { .. } => "operation_rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardPool {
    Vault,
    Staking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEvent {
    pub account: AccountId,
    pub amount: Amount,
    pub new_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDepositEvent {
    pub owner: AccountId,
    pub amount: Amount,
    pub shares_minted: u128,
    /// Reward compounding, lock not reset.
    pub compounded: bool,
    pub vault_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultWithdrawalEvent {
    pub owner: AccountId,
    pub shares: u128,
    pub stake_amount: Amount,
    pub paid: Amount,
    pub full: bool,
    pub vault_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub key: PositionKey,
    pub margin: Amount,
    pub leverage: Leverage,
    pub size: Amount,
    pub execution_price: Price,
    pub fee: Amount,
    /// Added to an existing position.
    pub merged: bool,
    pub total_margin: Amount,
    pub average_price: Price,
    pub average_leverage: Leverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginAddedEvent {
    pub key: PositionKey,
    pub amount: Amount,
    pub new_margin: Amount,
    pub new_leverage: Leverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    UserClosed,
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub key: PositionKey,
    pub margin_closed: Amount,
    pub size: Amount,
    pub execution_price: Price,
    pub pnl: SignedAmount,
    pub funding_cost: SignedAmount,
    /// pnl - funding after the take-profit guard.
    pub net: SignedAmount,
    pub fee: Amount,
    /// Returned to the owner.
    pub payout: Amount,
    pub full_close: bool,
    /// Profit zeroed by the take-profit guard.
    pub profit_withheld: bool,
    pub close_reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub key: PositionKey,
    pub liquidator: AccountId,
    pub mark_price: Price,
    pub margin: Amount,
    pub net: SignedAmount,
    pub fee: Amount,
    pub liquidator_reward: Amount,
    pub vault_credit: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingUpdatedEvent {
    pub instrument: InstrumentId,
    pub rate: i128,
    pub accrued: i128,
    pub cumulative: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OiUpdatedEvent {
    pub instrument: InstrumentId,
    pub long_oi: Amount,
    pub short_oi: Amount,
    pub total_oi: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistributedEvent {
    pub trader: AccountId,
    pub fee: Amount,
    pub referrer: Option<AccountId>,
    pub referrer_rebate: Amount,
    pub trader_rebate: Amount,
    pub vault_reward: Amount,
    pub staking_reward: Amount,
}

/// Published events with bounded retention. Ids keep counting after old events are dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    max_events: usize,
    next_id: u64,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
            next_id: 1,
        }
    }

    pub fn publish(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push_back(Event::new(id, timestamp, payload));
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
        id
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Ids handed out so far.
    pub fn published(&self) -> u64 {
        self.next_id - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_retention() {
        let mut log = EventLog::new(2);
        for paused in [true, false, true] {
            log.publish(Timestamp::from_secs(0), EventPayload::TradingPaused { paused });
        }

        assert_eq!(log.len(), 2);
        assert_eq!(log.published(), 3);
        let ids: Vec<_> = log.events().map(|e| e.id).collect();
        assert_eq!(ids, vec![EventId(2), EventId(3)]);
    }

    #[test]
    fn event_kinds() {
        let rejected = EventPayload::OperationRejected {
            operation: "open_position".to_string(),
            reason: "paused".to_string(),
        };
        assert_eq!(rejected.kind(), "operation_rejected");
        assert_eq!(EventPayload::ConfigUpdated.kind(), "config_updated");
    }

    #[test]
    fn events_serialize() {
        let event = Event::new(
            EventId(1),
            Timestamp::from_secs(1_000),
            EventPayload::CollateralDeposited(WalletEvent {
                account: AccountId(1),
                amount: Amount::from_units(10_000),
                new_balance: Amount::from_units(10_000),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
