//! Pooled liquidity vault.
//!
//! LPs deposit into one shared balance and receive shares. The vault is the counterparty to
//! every position: trader losses and fees flow in, trader profits flow out, so the share
//! price (`balance / shares`) floats. `staked` tracks principal at cost and is only used for
//! the deposit cap.

use crate::math::{self, MathError};
use crate::types::{AccountId, Amount, Timestamp, BASE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Ceiling on `staked`.
    pub cap: Amount,
    /// Seconds a stake stays locked after its last deposit.
    pub min_lock_duration_secs: i64,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            cap: Amount::from_units(1_000_000_000),
            min_lock_duration_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub owner: AccountId,
    /// Principal at cost.
    pub amount: Amount,
    pub shares: u128,
    /// Start of the current lock.
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub cap: Amount,
    pub balance: Amount,
    pub staked: Amount,
    pub shares: u128,
    pub min_lock_duration_secs: i64,
    stakes: BTreeMap<AccountId, Stake>,
}

/// A validated withdrawal, computed against current state but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub owner: AccountId,
    pub shares: u128,
    /// Principal retired from `staked`.
    pub stake_amount: Amount,
    /// What the LP is paid.
    pub balance_share: Amount,
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("deposit of {amount} exceeds cap {cap} (staked {staked})")]
    CapExceeded {
        amount: Amount,
        staked: Amount,
        cap: Amount,
    },

    #[error("vault has outstanding shares but zero balance")]
    Insolvent,

    #[error("redeeming {requested} shares exceeds supply {total}")]
    SharesExceedSupply { requested: u128, total: u128 },

    #[error("no stake for {0:?}")]
    StakeNotFound(AccountId),

    #[error("stake locked until {unlocks_at:?}")]
    LockActive { unlocks_at: Timestamp },

    #[error("vault balance {balance} cannot cover {requested}")]
    InsufficientBalance { requested: Amount, balance: Amount },

    #[error(transparent)]
    Math(#[from] MathError),
}

impl Vault {
    pub fn new(params: &VaultParams) -> Self {
        Self {
            cap: params.cap,
            balance: Amount::ZERO,
            staked: Amount::ZERO,
            shares: 0,
            min_lock_duration_secs: params.min_lock_duration_secs,
            stakes: BTreeMap::new(),
        }
    }

    pub fn stake(&self, owner: AccountId) -> Option<&Stake> {
        self.stakes.get(&owner)
    }

    pub fn stakes(&self) -> impl Iterator<Item = &Stake> {
        self.stakes.values()
    }

    /// Shares minted for `amount`: one-for-one into an empty vault, pro rata otherwise.
    pub fn preview_deposit(&self, amount: Amount) -> Result<u128, VaultError> {
        if self.shares == 0 {
            return Ok(amount.raw());
        }
        if self.balance.is_zero() {
            return Err(VaultError::Insolvent);
        }
        Ok(math::mul_div(amount.raw(), self.shares, self.balance.raw())?)
    }

    /// `reset_lock` is false only for compounded rewards.
    pub fn deposit(
        &mut self,
        owner: AccountId,
        amount: Amount,
        now: Timestamp,
        reset_lock: bool,
    ) -> Result<u128, VaultError> {
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let staked = self.staked.checked_add(amount).ok_or(MathError::Overflow)?;
        if staked > self.cap {
            return Err(VaultError::CapExceeded {
                amount,
                staked: self.staked,
                cap: self.cap,
            });
        }

        let minted = self.preview_deposit(amount)?;
        self.balance = self.balance.checked_add(amount).ok_or(MathError::Overflow)?;
        self.staked = staked;
        self.shares = math::add(self.shares, minted)?;

        let stake = self.stakes.entry(owner).or_insert(Stake {
            owner,
            amount: Amount::ZERO,
            shares: 0,
            timestamp: now,
        });
        stake.amount = stake.amount.checked_add(amount).ok_or(MathError::Overflow)?;
        stake.shares = math::add(stake.shares, minted)?;
        if reset_lock {
            stake.timestamp = now;
        }
        Ok(minted)
    }

    /// Validates a withdrawal of `shares` by `owner`. Requests above the stake clamp to a
    /// full redemption.
    pub fn preview_redeem(
        &self,
        owner: AccountId,
        shares: u128,
        now: Timestamp,
    ) -> Result<Redemption, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if shares > self.shares {
            return Err(VaultError::SharesExceedSupply {
                requested: shares,
                total: self.shares,
            });
        }
        let stake = self.stakes.get(&owner).ok_or(VaultError::StakeNotFound(owner))?;
        let unlocks_at = stake.timestamp.plus_secs(self.min_lock_duration_secs);
        if now < unlocks_at {
            return Err(VaultError::LockActive { unlocks_at });
        }

        let shares = shares.min(stake.shares);
        let full = shares == stake.shares;
        let stake_amount = math::mul_div(shares, stake.amount.raw(), stake.shares)?;
        let balance_share = math::mul_div(shares, self.balance.raw(), self.shares)?;

        Ok(Redemption {
            owner,
            shares,
            stake_amount: Amount::new(stake_amount),
            balance_share: Amount::new(balance_share),
            full,
        })
    }

    pub fn apply_redeem(&mut self, redemption: &Redemption) -> Result<(), VaultError> {
        self.balance = self
            .balance
            .checked_sub(redemption.balance_share)
            .ok_or(MathError::Underflow)?;
        self.staked = self.staked.saturating_sub(redemption.stake_amount);
        self.shares = math::sub(self.shares, redemption.shares)?;

        if redemption.full {
            self.stakes.remove(&redemption.owner);
        } else if let Some(stake) = self.stakes.get_mut(&redemption.owner) {
            stake.amount = stake.amount.saturating_sub(redemption.stake_amount);
            stake.shares = math::sub(stake.shares, redemption.shares)?;
        }
        Ok(())
    }

    pub fn credit(&mut self, amount: Amount) -> Result<(), VaultError> {
        self.balance = self.balance.checked_add(amount).ok_or(MathError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Amount) -> Result<(), VaultError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance {
                requested: amount,
                balance: self.balance,
            })?;
        Ok(())
    }

    /// Quote per share, None before the first deposit.
    pub fn share_price(&self) -> Option<Decimal> {
        if self.shares == 0 {
            return None;
        }
        // shares are minted 1:1 with raw amount units, so the ratio needs no rescaling
        let scaled = math::mul_div(self.balance.raw(), BASE, self.shares).ok()?;
        Some(Amount::new(scaled).to_decimal())
    }

    /// Current value of an LP's shares.
    pub fn stake_value(&self, owner: AccountId) -> Option<Amount> {
        let stake = self.stakes.get(&owner)?;
        if self.shares == 0 {
            return Some(Amount::ZERO);
        }
        math::mul_div(stake.shares, self.balance.raw(), self.shares)
            .ok()
            .map(Amount::new)
    }
}
