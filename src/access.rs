// access.rs: role table. the mechanism behind roles (multisig, governance) lives elsewhere;
// the engine just asks whether an account holds a role.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Listing, parameters, pauses, role grants.
    Admin,
    /// May open, close and top up positions on behalf of any owner.
    Manager,
    /// May liquidate while public liquidation is off.
    Liquidator,
    /// Pulls reward pools and compounds rewards into the vault.
    RewardRouter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Liquidator => "liquidator",
            Role::RewardRouter => "reward router",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    grants: BTreeMap<Role, BTreeSet<AccountId>>,
    /// Any account may liquidate.
    pub public_liquidation: bool,
}

impl AccessControl {
    pub fn with_admin(admin: AccountId) -> Self {
        let mut access = Self::default();
        access.grant(Role::Admin, admin);
        access
    }

    pub fn grant(&mut self, role: Role, account: AccountId) -> bool {
        self.grants.entry(role).or_default().insert(account)
    }

    pub fn revoke(&mut self, role: Role, account: AccountId) -> bool {
        self.grants
            .get_mut(&role)
            .map_or(false, |holders| holders.remove(&account))
    }

    pub fn has_role(&self, role: Role, account: AccountId) -> bool {
        self.grants
            .get(&role)
            .map_or(false, |holders| holders.contains(&account))
    }

    pub fn holders(&self, role: Role) -> impl Iterator<Item = &AccountId> {
        self.grants.get(&role).into_iter().flatten()
    }

    /// Owner acting for itself, or an approved manager acting for it.
    pub fn can_act_for(&self, caller: AccountId, owner: AccountId) -> bool {
        caller == owner || self.has_role(Role::Manager, caller)
    }

    pub fn can_liquidate(&self, caller: AccountId) -> bool {
        self.public_liquidation || self.has_role(Role::Liquidator, caller)
    }
}
