//! Fee routing, reward pools and referral rebates.

use super::core::Engine;
use super::results::{EngineError, ValidationError};
use crate::access::Role;
use crate::events::{EventPayload, FeeDistributedEvent, RewardPool};
use crate::fees::{calculate_trade_fee, split_fee};
use crate::position::size_of;
use crate::types::{AccountId, Amount, InstrumentId, Leverage};

impl Engine {
    /// Fee an open of `margin` at `leverage` would pay.
    pub fn quote_trade_fee(
        &self,
        instrument: InstrumentId,
        margin: Amount,
        leverage: Leverage,
    ) -> Result<Amount, EngineError> {
        let fee_rate = self.instrument(instrument)?.config.fee_rate;
        let size = size_of(margin, leverage)?;
        Ok(calculate_trade_fee(size, fee_rate)?)
    }

    /// Routes a collected fee: referral rebates first, then the vault/staking pools.
    pub(super) fn distribute_fee(&mut self, trader: AccountId, fee: Amount) -> Result<(), EngineError> {
        if fee.is_zero() {
            return Ok(());
        }

        let referral = self.collaborators.referrals.referrer_info(trader)?;
        if let Some(info) = &referral {
            info.validate()?;
        }
        let split = split_fee(fee, referral.as_ref(), &self.state.config.fees)?;

        if let Some((referrer, amount)) = split.referrer {
            self.accrue_rebate(referrer, amount)?;
        }
        if !split.trader_rebate.is_zero() {
            self.accrue_rebate(trader, split.trader_rebate)?;
        }
        self.state.pending_rewards.accrue(&split)?;

        self.emit_event(EventPayload::FeeDistributed(FeeDistributedEvent {
            trader,
            fee,
            referrer: split.referrer.map(|(id, _)| id),
            referrer_rebate: split.referrer.map_or(Amount::ZERO, |(_, a)| a),
            trader_rebate: split.trader_rebate,
            vault_reward: split.vault_reward,
            staking_reward: split.staking_reward,
        }));
        Ok(())
    }

    /// Drains the vault reward pool into the router's wallet.
    pub fn pull_vault_reward(&mut self, caller: AccountId) -> Result<Amount, EngineError> {
        self.transact("pull_vault_reward", |engine| {
            engine.require_role(Role::RewardRouter, caller, "pull vault rewards")?;
            let amount = engine.state.pending_rewards.drain_vault();
            engine.pay_reward(caller, RewardPool::Vault, amount)
        })
    }

    /// Drains the staking reward pool into the router's wallet.
    pub fn pull_staking_reward(&mut self, caller: AccountId) -> Result<Amount, EngineError> {
        self.transact("pull_staking_reward", |engine| {
            engine.require_role(Role::RewardRouter, caller, "pull staking rewards")?;
            let amount = engine.state.pending_rewards.drain_staking();
            engine.pay_reward(caller, RewardPool::Staking, amount)
        })
    }

    fn pay_reward(&mut self, router: AccountId, pool: RewardPool, amount: Amount) -> Result<Amount, EngineError> {
        self.credit_wallet(router, amount)?;
        self.emit_event(EventPayload::RewardPulled { pool, router, amount });
        Ok(amount)
    }

    /// Moves an account's accrued referral rebates into its wallet.
    pub fn claim_referral_rebate(&mut self, account: AccountId) -> Result<Amount, EngineError> {
        self.transact("claim_referral_rebate", |engine| {
            let wallet = engine
                .state
                .accounts
                .get_mut(&account)
                .ok_or(ValidationError::AccountNotFound(account))?;
            let amount = wallet.claim_rebates()?;
            engine.emit_event(EventPayload::RebateClaimed { account, amount });
            Ok(amount)
        })
    }
}
