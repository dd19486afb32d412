//! Account wallets.
//!
//! Every trader, LP, keeper and router has a wallet holding free collateral. Margin is taken
//! from it on open, returned to it on close; vault payouts, liquidation bounties and reward
//! pulls land in it. Referral rebates accrue separately until claimed.

use crate::types::{AccountId, Amount, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
    /// Referral rebates earned but not yet claimed into `balance`.
    pub referral_rebates: Amount,
    pub total_deposited: Amount,
    pub total_withdrawn: Amount,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            balance: Amount::ZERO,
            referral_rebates: Amount::ZERO,
            total_deposited: Amount::ZERO,
            total_withdrawn: Amount::ZERO,
            created_at: timestamp,
        }
    }

    /// External funding entering the system.
    pub fn deposit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.credit(amount)?;
        self.total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or(AccountError::Overflow)?;
        Ok(())
    }

    /// External funding leaving the system.
    pub fn withdraw(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.debit(amount)?;
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(AccountError::Overflow)?;
        Ok(())
    }

    /// Internal transfer in (payouts, bounties, rewards).
    pub fn credit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.balance = self.balance.checked_add(amount).ok_or(AccountError::Overflow)?;
        Ok(())
    }

    /// Internal transfer out (margin, fees, vault deposits).
    pub fn debit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(AccountError::InsufficientBalance {
                account: self.id,
                requested: amount,
                available: self.balance,
            })?;
        Ok(())
    }

    pub fn accrue_rebate(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.referral_rebates = self
            .referral_rebates
            .checked_add(amount)
            .ok_or(AccountError::Overflow)?;
        Ok(())
    }

    /// Moves all claimable rebates into the wallet. returns what moved.
    pub fn claim_rebates(&mut self) -> Result<Amount, AccountError> {
        let claimed = std::mem::take(&mut self.referral_rebates);
        self.credit(claimed)?;
        Ok(claimed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("account {account:?}: insufficient balance, requested {requested}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    #[error("account {0:?} not found")]
    NotFound(AccountId),

    #[error("account {0:?} already exists")]
    AlreadyExists(AccountId),

    #[error("wallet balance overflow")]
    Overflow,
}
