//! Collateral registry: per-asset risk parameters and aggregate deposits.
//!
//! Pure bookkeeping: authorization and lifecycle checks happen in the engine
//! before any of these methods are called.

use std::collections::HashMap;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use stable_common::error::EngineError;
use stable_common::types::{Amount, BPS_DENOMINATOR, Bps, CollateralConfig, MAX_STABILITY_FEE_BPS};

/// Validate a (collateral ratio, liquidation threshold) pair.
pub fn validate_ratios(collateral_ratio: Bps, liquidation_threshold: Bps) -> Result<(), EngineError> {
    if collateral_ratio <= liquidation_threshold {
        return Err(EngineError::InvalidRatios {
            collateral_ratio,
            liquidation_threshold,
        });
    }
    if liquidation_threshold < BPS_DENOMINATOR {
        return Err(EngineError::ThresholdTooLow(liquidation_threshold));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct CollateralRegistry {
    configs: HashMap<Address, CollateralConfig>,
    /// Registration order, used for iteration.
    assets: Vec<Address>,
}

impl CollateralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset`, or re-activate it with new parameters if it was
    /// previously deactivated. Deposits recorded against a deactivated asset
    /// are preserved.
    pub fn register(
        &mut self,
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
        price_source: Address,
        stability_fee_bps: Bps,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.configs.get(&asset).is_some_and(|c| c.is_active) {
            return Err(EngineError::DuplicateAsset(asset));
        }
        validate_ratios(collateral_ratio, liquidation_threshold)?;

        match self.configs.get_mut(&asset) {
            Some(existing) => {
                existing.is_active = true;
                existing.collateral_ratio = collateral_ratio;
                existing.liquidation_threshold = liquidation_threshold;
                existing.price_source = price_source;
            }
            None => {
                self.configs.insert(
                    asset,
                    CollateralConfig {
                        is_active: true,
                        deposited_total: 0,
                        collateral_ratio,
                        liquidation_threshold,
                        price_source,
                        stability_fee_bps,
                        registered_at: now,
                    },
                );
                self.assets.push(asset);
            }
        }
        Ok(())
    }

    pub fn update_ratios(
        &mut self,
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
    ) -> Result<(), EngineError> {
        validate_ratios(collateral_ratio, liquidation_threshold)?;
        let config = self.get_mut(asset)?;
        config.collateral_ratio = collateral_ratio;
        config.liquidation_threshold = liquidation_threshold;
        Ok(())
    }

    pub fn update_stability_fee(&mut self, asset: Address, fee_bps: Bps) -> Result<(), EngineError> {
        if fee_bps > MAX_STABILITY_FEE_BPS {
            return Err(EngineError::FeeTooHigh {
                fee: fee_bps,
                max: MAX_STABILITY_FEE_BPS,
            });
        }
        self.get_mut(asset)?.stability_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_active(&mut self, asset: Address, active: bool) -> Result<(), EngineError> {
        self.get_mut(asset)?.is_active = active;
        Ok(())
    }

    pub fn get(&self, asset: Address) -> Option<&CollateralConfig> {
        self.configs.get(&asset)
    }

    /// Config for an asset that must be registered.
    pub fn registered(&self, asset: Address) -> Result<&CollateralConfig, EngineError> {
        self.configs
            .get(&asset)
            .ok_or(EngineError::UnknownAsset(asset))
    }

    /// Config for an asset that must be registered and accepting deposits/mints.
    pub fn active(&self, asset: Address) -> Result<&CollateralConfig, EngineError> {
        match self.configs.get(&asset) {
            Some(config) if config.is_active => Ok(config),
            _ => Err(EngineError::UnsupportedAsset(asset)),
        }
    }

    pub fn credit(&mut self, asset: Address, amount: Amount) -> Result<(), EngineError> {
        let config = self.get_mut(asset)?;
        config.deposited_total = config
            .deposited_total
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, asset: Address, amount: Amount) -> Result<(), EngineError> {
        let config = self.get_mut(asset)?;
        config.deposited_total = config
            .deposited_total
            .checked_sub(amount)
            .ok_or(EngineError::Overflow)?;
        Ok(())
    }

    /// Sum of `deposited_total` over active assets.
    pub fn total_collateral_value(&self) -> Result<Amount, EngineError> {
        self.assets
            .iter()
            .filter_map(|asset| self.configs.get(asset))
            .filter(|config| config.is_active)
            .try_fold(0, |total: Amount, config| {
                total
                    .checked_add(config.deposited_total)
                    .ok_or(EngineError::Overflow)
            })
    }

    /// Registered assets in registration order.
    pub fn assets(&self) -> &[Address] {
        &self.assets
    }

    fn get_mut(&mut self, asset: Address) -> Result<&mut CollateralConfig, EngineError> {
        self.configs
            .get_mut(&asset)
            .ok_or(EngineError::UnknownAsset(asset))
    }
}
