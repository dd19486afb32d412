// 7.0 config.rs: all exchange settings in one place. risk bounds, price impact, funding,
// liquidation, fee split, vault limits. the engine owns one ExchangeConfig and admin
// setters swap in validated replacements.
// 7.1 presets per environment at the bottom.

use serde::{Deserialize, Serialize};

use crate::fees::FeeParams;
use crate::funding::FundingParams;
use crate::liquidation::LiquidationParams;
use crate::price_impact::ImpactParams;
use crate::risk::RiskParams;
use crate::types::{Amount, Bps, BASE};
use crate::vault::VaultParams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub risk: RiskParams,
    pub impact: ImpactParams,
    pub funding: FundingParams,
    pub liquidation: LiquidationParams,
    pub fees: FeeParams,
    pub vault: VaultParams,
    // Opens, closes and margin top-ups are rejected while set
    pub trading_paused: bool,
    // Vault deposits are rejected while cleared
    pub staking_enabled: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            risk: RiskParams::default(),
            impact: ImpactParams::default(),
            funding: FundingParams::default(),
            liquidation: LiquidationParams::default(),
            fees: FeeParams::default(),
            vault: VaultParams::default(),
            trading_paused: false,
            staking_enabled: true,
        }
    }
}

impl ExchangeConfig {
    // Local development: no lock, no profit guard, everything permissive
    pub fn development() -> Self {
        let mut config = Self::default();
        config.vault.min_lock_duration_secs = 0;
        config.risk.min_margin = Amount::from_units(1);
        config
    }

    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.risk.min_profit_time_secs = 60;
        config.vault.cap = Amount::from_units(10_000_000);
        config.vault.min_lock_duration_secs = 600; // 10 minutes
        config
    }

    // Mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.risk.utilization_multiplier = Bps::new(5_000); // 50%
        config.risk.exposure_multiplier = Bps::new(5_000);
        config.risk.min_profit_time_secs = 600;
        config.liquidation.liquidation_threshold = Bps::new(8_000);
        config.liquidation.liquidation_bounty = Bps::new(2_000);
        config.vault.min_lock_duration_secs = 86_400; // 1 day
        config.staking_enabled = true;
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // risk checks
        if self.risk.min_margin.is_zero() {
            return Err(ConfigError::InvalidRisk {
                reason: "min margin must be positive".to_string(),
            });
        }
        if self.risk.min_margin >= self.risk.max_margin {
            return Err(ConfigError::InvalidRisk {
                reason: "min margin must be below max margin".to_string(),
            });
        }
        if self.risk.utilization_multiplier == Bps::ZERO || self.risk.exposure_multiplier == Bps::ZERO {
            return Err(ConfigError::InvalidRisk {
                reason: "utilization and exposure multipliers must be positive".to_string(),
            });
        }
        if self.risk.min_profit_time_secs < 0 {
            return Err(ConfigError::InvalidRisk {
                reason: "min profit time cannot be negative".to_string(),
            });
        }

        // price impact checks
        if self.impact.shift_divider == 0 {
            return Err(ConfigError::InvalidImpact {
                reason: "shift divider must be positive".to_string(),
            });
        }
        if self.impact.max_shift >= BASE {
            return Err(ConfigError::InvalidImpact {
                reason: "max shift must be below 100%".to_string(),
            });
        }

        // funding checks
        if self.funding.max_funding_rate < 0 || self.funding.min_funding_multiplier < 0 {
            return Err(ConfigError::InvalidFunding {
                reason: "funding rate bounds cannot be negative".to_string(),
            });
        }

        // liquidation checks
        let threshold = self.liquidation.liquidation_threshold;
        if threshold == Bps::ZERO || threshold > Bps::FULL {
            return Err(ConfigError::InvalidLiquidation {
                reason: "threshold must be in (0, 100%]".to_string(),
            });
        }
        if self.liquidation.liquidation_bounty > Bps::FULL {
            return Err(ConfigError::InvalidLiquidation {
                reason: "bounty above 100%".to_string(),
            });
        }

        // fee checks
        if self.fees.vault_fee_ratio > Bps::FULL {
            return Err(ConfigError::InvalidFees {
                reason: "vault fee ratio above 100%".to_string(),
            });
        }

        // vault checks
        if self.vault.min_lock_duration_secs < 0 {
            return Err(ConfigError::InvalidVault {
                reason: "lock duration cannot be negative".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid risk config: {reason}")]
    InvalidRisk { reason: String },
    #[error("invalid price impact config: {reason}")]
    InvalidImpact { reason: String },
    #[error("invalid funding config: {reason}")]
    InvalidFunding { reason: String },
    #[error("invalid liquidation config: {reason}")]
    InvalidLiquidation { reason: String },
    #[error("invalid fee config: {reason}")]
    InvalidFees { reason: String },
    #[error("invalid vault config: {reason}")]
    InvalidVault { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ExchangeConfig {
        match self {
            Environment::Development => ExchangeConfig::development(),
            Environment::Testnet => ExchangeConfig::testnet(),
            Environment::Mainnet => ExchangeConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ExchangeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
        assert_eq!(Environment::Development.config().vault.min_lock_duration_secs, 0);
        assert_eq!(Environment::Mainnet.config().risk.utilization_multiplier, Bps::new(5_000));
    }

    #[test]
    fn test_invalid_margin_band() {
        let mut config = ExchangeConfig::default();
        config.risk.max_margin = config.risk.min_margin;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRisk { .. })));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = ExchangeConfig::default();
        config.liquidation.liquidation_threshold = Bps::new(10_001);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLiquidation { .. })));
    }

    #[test]
    fn test_invalid_divider() {
        let mut config = ExchangeConfig::default();
        config.impact.shift_divider = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidImpact { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = ExchangeConfig::mainnet_conservative();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExchangeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_environment_serde_names() {
        let json = serde_json::to_string(&Environment::Testnet).unwrap();
        assert_eq!(json, "\"testnet\"");
    }
}
