//! LP vault entry points.

use super::core::Engine;
use super::results::{EngineError, ValidationError, WithdrawResult};
use crate::access::Role;
use crate::events::{EventPayload, VaultDepositEvent, VaultWithdrawalEvent};
use crate::types::{AccountId, Amount};
use rust_decimal::Decimal;

impl Engine {
    /// Stakes `amount` from the owner's wallet. Resets the stake's lock.
    pub fn deposit_vault(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        amount: Amount,
    ) -> Result<u128, EngineError> {
        self.transact("deposit_vault", |engine| {
            engine.require_owner_or_manager(caller, owner, "deposit into the vault")?;
            engine.stake_into_vault(owner, owner, amount, false)
        })
    }

    /// Router path for restaking rewards: funds come from the router's wallet and the
    /// owner's lock is left alone.
    pub fn compound_into_vault(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        amount: Amount,
    ) -> Result<u128, EngineError> {
        self.transact("compound_into_vault", |engine| {
            engine.require_role(Role::RewardRouter, caller, "compound into the vault")?;
            engine.stake_into_vault(caller, owner, amount, true)
        })
    }

    fn stake_into_vault(
        &mut self,
        payer: AccountId,
        owner: AccountId,
        amount: Amount,
        compounded: bool,
    ) -> Result<u128, EngineError> {
        if !self.state.config.staking_enabled {
            return Err(ValidationError::StakingDisabled.into());
        }
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        self.debit_wallet(payer, amount)?;
        let shares_minted = self
            .state
            .vault
            .deposit(owner, amount, self.current_time, !compounded)?;

        self.emit_event(EventPayload::VaultDeposit(VaultDepositEvent {
            owner,
            amount,
            shares_minted,
            compounded,
            vault_balance: self.state.vault.balance,
        }));
        Ok(shares_minted)
    }

    /// Redeems shares for their slice of the vault balance, paid to the owner's wallet.
    pub fn withdraw_vault(
        &mut self,
        caller: AccountId,
        owner: AccountId,
        shares: u128,
    ) -> Result<WithdrawResult, EngineError> {
        self.transact("withdraw_vault", |engine| {
            engine.require_owner_or_manager(caller, owner, "withdraw from the vault")?;

            let redemption = engine.state.vault.preview_redeem(owner, shares, engine.current_time)?;
            engine.state.vault.apply_redeem(&redemption)?;
            // open interest must stay backed by what's left, in total and per instrument
            engine.check_book_limits()?;
            engine.credit_wallet(owner, redemption.balance_share)?;

            engine.emit_event(EventPayload::VaultWithdrawal(VaultWithdrawalEvent {
                owner,
                shares: redemption.shares,
                stake_amount: redemption.stake_amount,
                paid: redemption.balance_share,
                full: redemption.full,
                vault_balance: engine.state.vault.balance,
            }));
            Ok(WithdrawResult {
                shares: redemption.shares,
                paid: redemption.balance_share,
                full: redemption.full,
            })
        })
    }

    pub fn share_price(&self) -> Option<Decimal> {
        self.state.vault.share_price()
    }
}
