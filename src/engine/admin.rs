//! Admin-role operations: listings, parameters, switches and roles.

use super::core::Engine;
use super::results::{EngineError, ValidationError};
use crate::access::Role;
use crate::config::ExchangeConfig;
use crate::events::EventPayload;
use crate::instrument::{Instrument, InstrumentConfig};
use crate::types::{AccountId, Amount, InstrumentId};

impl Engine {
    pub fn list_instrument(
        &mut self,
        caller: AccountId,
        config: InstrumentConfig,
    ) -> Result<InstrumentId, EngineError> {
        self.transact("list_instrument", |engine| {
            engine.require_role(Role::Admin, caller, "list instruments")?;
            config.validate()?;
            let id = config.id;
            if engine.state.instruments.contains_key(&id) {
                return Err(ValidationError::InstrumentAlreadyListed(id).into());
            }

            let name = config.name.clone();
            engine
                .state
                .instruments
                .insert(id, Instrument::new(config, engine.current_time));
            // the new weight shrinks every other instrument's slice
            engine.check_book_limits()?;

            tracing::info!(instrument = id.0, %name, "instrument listed");
            engine.emit_event(EventPayload::InstrumentListed { instrument: id, name });
            Ok(id)
        })
    }

    /// Replaces an instrument's parameters. Open interest and the funding index carry over;
    /// funding is settled at the old parameters first.
    pub fn update_instrument(
        &mut self,
        caller: AccountId,
        config: InstrumentConfig,
    ) -> Result<(), EngineError> {
        self.transact("update_instrument", |engine| {
            engine.require_role(Role::Admin, caller, "update instruments")?;
            config.validate()?;
            let id = config.id;
            engine.advance_funding(id)?;

            let active = config.active;
            engine.instrument_mut(id)?.reconfigure(config);
            engine.check_book_limits()?;

            tracing::info!(instrument = id.0, active, "instrument updated");
            engine.emit_event(EventPayload::InstrumentUpdated { instrument: id, active });
            Ok(())
        })
    }

    pub fn set_funding_multiplier(
        &mut self,
        caller: AccountId,
        id: InstrumentId,
        multiplier: i128,
    ) -> Result<(), EngineError> {
        self.transact("set_funding_multiplier", |engine| {
            engine.require_role(Role::Admin, caller, "set funding multipliers")?;
            if multiplier < 0 {
                return Err(ValidationError::InvalidConfig(format!(
                    "funding multiplier {multiplier} is negative"
                ))
                .into());
            }
            // accrue up to now at the old multiplier
            engine.advance_funding(id)?;

            let instrument = engine.instrument_mut(id)?;
            instrument.funding.multiplier = multiplier;
            instrument.config.funding_multiplier = multiplier;
            let active = instrument.is_active();

            tracing::info!(instrument = id.0, multiplier, "funding multiplier set");
            engine.emit_event(EventPayload::InstrumentUpdated { instrument: id, active });
            Ok(())
        })
    }

    /// Swaps in a validated config. Vault limits follow it. Risk multipliers can't be cut
    /// below what the open book already uses.
    pub fn update_config(&mut self, caller: AccountId, config: ExchangeConfig) -> Result<(), EngineError> {
        self.transact("update_config", |engine| {
            engine.require_role(Role::Admin, caller, "update config")?;
            config.validate()?;
            engine.state.vault.cap = config.vault.cap;
            engine.state.vault.min_lock_duration_secs = config.vault.min_lock_duration_secs;
            engine.state.config = config;
            engine.check_book_limits()?;

            tracing::info!("exchange config updated");
            engine.emit_event(EventPayload::ConfigUpdated);
            Ok(())
        })
    }

    pub fn set_trading_paused(&mut self, caller: AccountId, paused: bool) -> Result<(), EngineError> {
        self.transact("set_trading_paused", |engine| {
            engine.require_role(Role::Admin, caller, "pause trading")?;
            engine.state.config.trading_paused = paused;
            tracing::info!(paused, "trading pause toggled");
            engine.emit_event(EventPayload::TradingPaused { paused });
            Ok(())
        })
    }

    pub fn set_staking_enabled(&mut self, caller: AccountId, enabled: bool) -> Result<(), EngineError> {
        self.transact("set_staking_enabled", |engine| {
            engine.require_role(Role::Admin, caller, "toggle staking")?;
            engine.state.config.staking_enabled = enabled;
            tracing::info!(enabled, "staking toggled");
            engine.emit_event(EventPayload::StakingEnabled { enabled });
            Ok(())
        })
    }

    pub fn set_vault_limits(
        &mut self,
        caller: AccountId,
        cap: Amount,
        min_lock_duration_secs: i64,
    ) -> Result<(), EngineError> {
        self.transact("set_vault_limits", |engine| {
            engine.require_role(Role::Admin, caller, "set vault limits")?;
            let mut config = engine.state.config.clone();
            config.vault.cap = cap;
            config.vault.min_lock_duration_secs = min_lock_duration_secs;
            config.validate()?;

            engine.state.config = config;
            engine.state.vault.cap = cap;
            engine.state.vault.min_lock_duration_secs = min_lock_duration_secs;

            tracing::info!(%cap, min_lock_duration_secs, "vault limits set");
            engine.emit_event(EventPayload::VaultLimitsUpdated {
                cap,
                min_lock_duration_secs,
            });
            Ok(())
        })
    }

    pub fn grant_role(&mut self, caller: AccountId, role: Role, account: AccountId) -> Result<bool, EngineError> {
        self.transact("grant_role", |engine| {
            engine.require_role(Role::Admin, caller, "grant roles")?;
            let granted = engine.state.access.grant(role, account);
            if granted {
                tracing::info!(%role, account = account.0, "role granted");
                engine.emit_event(EventPayload::RoleGranted { role, account });
            }
            Ok(granted)
        })
    }

    /// An admin can't revoke its own admin role; that would leave the exchange unmanaged.
    pub fn revoke_role(&mut self, caller: AccountId, role: Role, account: AccountId) -> Result<bool, EngineError> {
        self.transact("revoke_role", |engine| {
            engine.require_role(Role::Admin, caller, "revoke roles")?;
            if role == Role::Admin && account == caller {
                return Err(EngineError::Unauthorized {
                    caller,
                    action: "revoke own admin role",
                });
            }
            let revoked = engine.state.access.revoke(role, account);
            if revoked {
                tracing::info!(%role, account = account.0, "role revoked");
                engine.emit_event(EventPayload::RoleRevoked { role, account });
            }
            Ok(revoked)
        })
    }

    pub fn set_public_liquidation(&mut self, caller: AccountId, enabled: bool) -> Result<(), EngineError> {
        self.transact("set_public_liquidation", |engine| {
            engine.require_role(Role::Admin, caller, "toggle public liquidation")?;
            engine.state.access.public_liquidation = enabled;
            tracing::info!(enabled, "public liquidation toggled");
            engine.emit_event(EventPayload::PublicLiquidation { enabled });
            Ok(())
        })
    }
}
