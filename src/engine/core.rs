// 8.0 engine/core.rs: main engine. holds the ledger, the collaborators and the event log.
// every mutating entry point goes through transact(), which is the only place state is
// snapshotted, restored, or committed.

use super::config::EngineConfig;
use super::results::{EngineError, ValidationError};
use crate::access::{AccessControl, Role};
use crate::account::Account;
use crate::conditional::{CloseOrderManager, NoCloseOrders};
use crate::config::ExchangeConfig;
use crate::events::{Event, EventLog, EventPayload, WalletEvent};
use crate::fees::PendingRewards;
use crate::instrument::Instrument;
use crate::position::Position;
use crate::price_feed::PriceSource;
use crate::referral::{NoReferrals, ReferralRegistry};
use crate::types::{AccountId, Amount, InstrumentId, PositionKey, Timestamp};
use crate::vault::{Stake, Vault};
use std::collections::BTreeMap;
use std::sync::Arc;

/// External systems the engine consults mid-transaction.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub prices: Arc<dyn PriceSource>,
    pub referrals: Arc<dyn ReferralRegistry>,
    pub orders: Arc<dyn CloseOrderManager>,
}

impl Collaborators {
    /// Price source only: no referrals, no close orders.
    pub fn new(prices: Arc<dyn PriceSource>) -> Self {
        Self {
            prices,
            referrals: Arc::new(NoReferrals),
            orders: Arc::new(NoCloseOrders),
        }
    }

    pub fn with_referrals(mut self, referrals: Arc<dyn ReferralRegistry>) -> Self {
        self.referrals = referrals;
        self
    }

    pub fn with_orders(mut self, orders: Arc<dyn CloseOrderManager>) -> Self {
        self.orders = orders;
        self
    }
}

/// Everything a transaction may touch. Cloned at transaction start and restored on error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    pub config: ExchangeConfig,
    pub vault: Vault,
    pub instruments: BTreeMap<InstrumentId, Instrument>,
    pub positions: BTreeMap<PositionKey, Position>,
    pub accounts: BTreeMap<AccountId, Account>,
    pub total_open_interest: Amount,
    pub pending_rewards: PendingRewards,
    pub access: AccessControl,
}

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) state: LedgerState,
    pub(super) collaborators: Collaborators,
    pub(super) events: EventLog,
    pub(super) staged: Vec<EventPayload>,
    pub(super) deferred_cancels: Vec<PositionKey>,
    pub(super) tx_open: bool,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        exchange: ExchangeConfig,
        admin: AccountId,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        exchange.validate()?;
        let current_time = config.start_time;

        let mut accounts = BTreeMap::new();
        accounts.insert(admin, Account::new(admin, current_time));

        let state = LedgerState {
            vault: Vault::new(&exchange.vault),
            config: exchange,
            instruments: BTreeMap::new(),
            positions: BTreeMap::new(),
            accounts,
            total_open_interest: Amount::ZERO,
            pending_rewards: PendingRewards::default(),
            access: AccessControl::with_admin(admin),
        };

        Ok(Self {
            events: EventLog::new(config.max_events),
            config,
            state,
            collaborators,
            staged: Vec::new(),
            deferred_cancels: Vec::new(),
            tx_open: false,
            current_time,
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    /// Runs `f` as one atomic transaction. On error the ledger is restored, staged events
    /// and deferred cancellations are dropped, and a rejection event is published.
    pub(super) fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.tx_open {
            return Err(EngineError::Reentrant);
        }
        self.tx_open = true;
        let snapshot = self.state.clone();

        let result = f(self);
        self.tx_open = false;

        match result {
            Ok(value) => {
                for payload in std::mem::take(&mut self.staged) {
                    self.publish(payload);
                }
                // collaborators only hear about committed closes
                for key in std::mem::take(&mut self.deferred_cancels) {
                    self.collaborators.orders.cancel_dependent_close_orders(key);
                }
                tracing::debug!(operation, "committed");
                Ok(value)
            }
            Err(err) => {
                self.state = snapshot;
                self.staged.clear();
                self.deferred_cancels.clear();
                self.reject(operation, &err);
                Err(err)
            }
        }
    }

    pub(super) fn reject(&mut self, operation: &'static str, err: &EngineError) {
        tracing::warn!(operation, error = %err, "operation rejected");
        self.publish(EventPayload::OperationRejected {
            operation: operation.to_string(),
            reason: err.to_string(),
        });
    }

    /// Stages an event for publication when the current transaction commits.
    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        self.staged.push(payload);
    }

    pub(super) fn defer_cancel(&mut self, key: PositionKey) {
        self.deferred_cancels.push(key);
    }

    fn publish(&mut self, payload: EventPayload) {
        let id = self.events.publish(self.current_time, payload);
        if self.config.log_events {
            if let Some(event) = self.events.last() {
                tracing::debug!(id = id.0, kind = event.payload.kind(), payload = ?event.payload, "event");
            }
        }
    }

    pub(super) fn require_role(
        &self,
        role: Role,
        caller: AccountId,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.state.access.has_role(role, caller) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized { caller, action })
        }
    }

    pub(super) fn require_owner_or_manager(
        &self,
        caller: AccountId,
        owner: AccountId,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.state.access.can_act_for(caller, owner) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized { caller, action })
        }
    }

    pub(super) fn instrument(&self, id: InstrumentId) -> Result<&Instrument, EngineError> {
        self.state
            .instruments
            .get(&id)
            .ok_or(ValidationError::InstrumentNotFound(id).into())
    }

    pub(super) fn instrument_mut(&mut self, id: InstrumentId) -> Result<&mut Instrument, EngineError> {
        self.state
            .instruments
            .get_mut(&id)
            .ok_or(ValidationError::InstrumentNotFound(id).into())
    }

    pub(super) fn debit_wallet(&mut self, id: AccountId, amount: Amount) -> Result<(), EngineError> {
        let account = self
            .state
            .accounts
            .get_mut(&id)
            .ok_or(ValidationError::AccountNotFound(id))?;
        account.debit(amount)?;
        Ok(())
    }

    // credits land even on accounts the engine hasn't seen (keepers, referrers, routers)
    pub(super) fn credit_wallet(&mut self, id: AccountId, amount: Amount) -> Result<Amount, EngineError> {
        let now = self.current_time;
        let account = self
            .state
            .accounts
            .entry(id)
            .or_insert_with(|| Account::new(id, now));
        account.credit(amount)?;
        Ok(account.balance)
    }

    pub(super) fn accrue_rebate(&mut self, id: AccountId, amount: Amount) -> Result<(), EngineError> {
        let now = self.current_time;
        self.state
            .accounts
            .entry(id)
            .or_insert_with(|| Account::new(id, now))
            .accrue_rebate(amount)?;
        Ok(())
    }

    pub fn create_account(&mut self) -> Result<AccountId, EngineError> {
        self.transact("create_account", |engine| {
            let id = engine
                .state
                .accounts
                .keys()
                .next_back()
                .map_or(AccountId(1), |last| AccountId(last.0 + 1));
            engine.state.accounts.insert(id, Account::new(id, engine.current_time));
            engine.emit_event(EventPayload::AccountCreated { account: id });
            Ok(id)
        })
    }

    /// External collateral entering a wallet.
    pub fn deposit_collateral(&mut self, account_id: AccountId, amount: Amount) -> Result<Amount, EngineError> {
        self.transact("deposit_collateral", |engine| {
            if amount.is_zero() {
                return Err(ValidationError::ZeroAmount.into());
            }
            let account = engine
                .state
                .accounts
                .get_mut(&account_id)
                .ok_or(ValidationError::AccountNotFound(account_id))?;
            account.deposit(amount)?;
            let new_balance = account.balance;

            engine.emit_event(EventPayload::CollateralDeposited(WalletEvent {
                account: account_id,
                amount,
                new_balance,
            }));
            Ok(new_balance)
        })
    }

    /// Collateral leaving the system. Margin locked in positions is not in the wallet.
    pub fn withdraw_collateral(&mut self, account_id: AccountId, amount: Amount) -> Result<Amount, EngineError> {
        self.transact("withdraw_collateral", |engine| {
            if amount.is_zero() {
                return Err(ValidationError::ZeroAmount.into());
            }
            let account = engine
                .state
                .accounts
                .get_mut(&account_id)
                .ok_or(ValidationError::AccountNotFound(account_id))?;
            account.withdraw(amount)?;
            let new_balance = account.balance;

            engine.emit_event(EventPayload::CollateralWithdrawn(WalletEvent {
                account: account_id,
                amount,
                new_balance,
            }));
            Ok(new_balance)
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn exchange_config(&self) -> &ExchangeConfig {
        &self.state.config
    }

    pub fn vault(&self) -> &Vault {
        &self.state.vault
    }

    pub fn stake(&self, owner: AccountId) -> Option<&Stake> {
        self.state.vault.stake(owner)
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&Account> {
        self.state.accounts.get(&account_id)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &Account)> {
        self.state.accounts.iter()
    }

    pub fn get_instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.state.instruments.get(&id)
    }

    pub fn instruments_iter(&self) -> impl Iterator<Item = &Instrument> {
        self.state.instruments.values()
    }

    pub fn get_position(&self, key: PositionKey) -> Option<&Position> {
        self.state.positions.get(&key)
    }

    pub fn positions_iter(&self) -> impl Iterator<Item = &Position> {
        self.state.positions.values()
    }

    pub fn total_open_interest(&self) -> Amount {
        self.state.total_open_interest
    }

    pub fn pending_rewards(&self) -> &PendingRewards {
        &self.state.pending_rewards
    }

    pub fn access(&self) -> &AccessControl {
        &self.state.access
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> Vec<&Event> {
        let skip = self.events.len().saturating_sub(count);
        self.events.events().skip(skip).collect()
    }

    /// Sum of every token the ledger holds: wallets, claimable rebates, vault balance,
    /// position margin and undistributed rewards. Only external deposits and withdrawals
    /// move it.
    pub fn total_tokens(&self) -> Amount {
        let wallets: Amount = self
            .state
            .accounts
            .values()
            .map(|a| Amount::new(a.balance.raw().saturating_add(a.referral_rebates.raw())))
            .sum();
        let margins: Amount = self.state.positions.values().map(|p| p.margin).sum();
        [wallets, margins, self.state.vault.balance, self.state.pending_rewards.total()]
            .iter()
            .sum()
    }
}
