use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token amount in the asset's smallest unit.
pub type Amount = u128;

/// Basis points (10_000 = 100%).
pub type Bps = u32;

/// Denominator for all basis-point arithmetic.
pub const BPS_DENOMINATOR: Bps = 10_000;

/// Fixed-point precision of every price returned by the oracle adapter.
pub const PRICE_DECIMALS: u8 = 8;

/// Upper bound for the per-asset stability fee.
pub const MAX_STABILITY_FEE_BPS: Bps = 1_000;

/// Upper bound for the liquidation penalty taken from seized collateral.
pub const MAX_LIQUIDATION_PENALTY_BPS: Bps = 5_000;

/// Highest native feed precision the adapter will rescale from.
pub const MAX_FEED_DECIMALS: u8 = 30;

/// Health factor reported for positions without debt.
pub const MAX_HEALTH_FACTOR: u128 = u128::MAX;

/// Health factor reported for indebted positions whose ratio exceeds `u128`.
pub const SATURATED_HEALTH_FACTOR: u128 = u128::MAX - 1;

/// Capabilities an identity can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pause/unpause and role administration.
    Admin,
    /// Collateral registry, fee and penalty administration.
    Manager,
    /// Price feed administration.
    OracleManager,
    /// Vault-facing deposit/withdraw entry points.
    Operator,
    /// The stablecoin token contract recording issuance and redemption.
    Minter,
    /// May settle undercollateralized positions.
    Liquidator,
}

/// Global lifecycle state of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Active,
    Paused,
}

/// Per-asset collateral configuration and aggregate accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Whether deposits and mints against this asset are permitted.
    pub is_active: bool,
    /// Sum of all positions' collateral for this asset.
    pub deposited_total: Amount,
    /// Minimum collateral/debt ratio required to mint, in bps.
    pub collateral_ratio: Bps,
    /// Ratio below which a position can be liquidated, in bps.
    pub liquidation_threshold: Bps,
    /// Oracle entry that prices this asset.
    pub price_source: Address,
    /// Stability fee charged by the minting collaborator, in bps.
    pub stability_fee_bps: Bps,
    pub registered_at: DateTime<Utc>,
}

/// Collateral and debt held by one user against one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserPosition {
    pub collateral_amount: Amount,
    pub minted_amount: Amount,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl UserPosition {
    pub fn is_empty(&self) -> bool {
        self.collateral_amount == 0 && self.minted_amount == 0
    }
}

/// Oracle configuration for one priced asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Upstream feed queried for this asset.
    pub feed: Address,
    /// Maximum tolerated age of an upstream reading, in seconds.
    pub heartbeat_secs: u64,
    /// Native precision of the upstream feed.
    pub decimals: u8,
    pub is_active: bool,
    /// Administrator-set USD price (8 decimals); zero means unset.
    pub manual_fallback: u128,
}

/// Which resolution step produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Primary,
    Fallback,
}

/// A resolved USD price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// USD price with `PRICE_DECIMALS` decimals.
    pub price: u128,
    pub timestamp: DateTime<Utc>,
    pub source: QuoteSource,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::OracleManager => write!(f, "oracle_manager"),
            Role::Operator => write!(f, "operator"),
            Role::Minter => write!(f, "minter"),
            Role::Liquidator => write!(f, "liquidator"),
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Active => write!(f, "active"),
            Lifecycle::Paused => write!(f, "paused"),
        }
    }
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::Primary => write!(f, "primary"),
            QuoteSource::Fallback => write!(f, "fallback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_matches_serde() {
        for role in [
            Role::Admin,
            Role::Manager,
            Role::OracleManager,
            Role::Operator,
            Role::Minter,
            Role::Liquidator,
        ] {
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json.as_str().unwrap(), role.to_string());
        }
    }

    #[test]
    fn test_default_position_is_empty() {
        let position = UserPosition::default();
        assert!(position.is_empty());
        assert!(position.last_update_time.is_none());
    }

    #[test]
    fn test_lifecycle_defaults_to_active() {
        assert_eq!(Lifecycle::default(), Lifecycle::Active);
    }
}
