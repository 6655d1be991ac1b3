use std::str::FromStr;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::types::{Bps, Lifecycle, MAX_LIQUIDATION_PENALTY_BPS, MAX_STABILITY_FEE_BPS};

/// Default liquidation penalty: 10% of seized collateral.
pub const DEFAULT_LIQUIDATION_PENALTY_BPS: Bps = 1_000;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Receives the liquidation penalty share of seized collateral.
    pub treasury: Address,

    /// Cut of seized collateral paid to the treasury (default: 1000 = 10%)
    pub liquidation_penalty_bps: Bps,

    /// Stability fee assigned to newly registered collateral (default: 0)
    pub default_stability_fee_bps: Bps,

    /// Lifecycle state a new engine starts in (default: active)
    pub initial_state: Lifecycle,
}

impl EngineConfig {
    /// Configuration with defaults for everything except the treasury.
    pub fn new(treasury: Address) -> Self {
        Self {
            treasury,
            liquidation_penalty_bps: DEFAULT_LIQUIDATION_PENALTY_BPS,
            default_stability_fee_bps: 0,
            initial_state: Lifecycle::Active,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let treasury = std::env::var("TREASURY_ADDRESS")
            .map_err(|_| anyhow::anyhow!("TREASURY_ADDRESS environment variable is required"))?;

        let config = Self {
            treasury: Address::from_str(&treasury)
                .map_err(|_| anyhow::anyhow!("TREASURY_ADDRESS must be a 20-byte hex address"))?,
            liquidation_penalty_bps: std::env::var("LIQUIDATION_PENALTY_BPS")
                .unwrap_or_else(|_| DEFAULT_LIQUIDATION_PENALTY_BPS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LIQUIDATION_PENALTY_BPS must be a valid u32"))?,
            default_stability_fee_bps: std::env::var("DEFAULT_STABILITY_FEE_BPS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_STABILITY_FEE_BPS must be a valid u32"))?,
            initial_state: match std::env::var("ENGINE_START_PAUSED")
                .unwrap_or_else(|_| "false".to_string())
                .parse::<bool>()
            {
                Ok(true) => Lifecycle::Paused,
                Ok(false) => Lifecycle::Active,
                Err(_) => anyhow::bail!("ENGINE_START_PAUSED must be true or false"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values above the protocol's hard caps.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.liquidation_penalty_bps > MAX_LIQUIDATION_PENALTY_BPS {
            anyhow::bail!(
                "liquidation penalty {} bps exceeds maximum {} bps",
                self.liquidation_penalty_bps,
                MAX_LIQUIDATION_PENALTY_BPS
            );
        }
        if self.default_stability_fee_bps > MAX_STABILITY_FEE_BPS {
            anyhow::bail!(
                "stability fee {} bps exceeds maximum {} bps",
                self.default_stability_fee_bps,
                MAX_STABILITY_FEE_BPS
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(Address::repeat_byte(0x7E));
        assert_eq!(config.liquidation_penalty_bps, 1_000);
        assert_eq!(config.default_stability_fee_bps, 0);
        assert_eq!(config.initial_state, Lifecycle::Active);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_excessive_penalty() {
        let mut config = EngineConfig::new(Address::ZERO);
        config.liquidation_penalty_bps = MAX_LIQUIDATION_PENALTY_BPS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excessive_fee() {
        let mut config = EngineConfig::new(Address::ZERO);
        config.default_stability_fee_bps = MAX_STABILITY_FEE_BPS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "treasury": "0x7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
            "liquidation_penalty_bps": 500,
            "default_stability_fee_bps": 100,
            "initial_state": "paused"
        }))
        .unwrap();
        assert_eq!(config.treasury, Address::repeat_byte(0x7E));
        assert_eq!(config.initial_state, Lifecycle::Paused);
    }
}
