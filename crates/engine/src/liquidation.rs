//! Liquidation settlement planning.
//!
//! A liquidation seizes the whole position: all collateral leaves the
//! system, all debt is written off. The treasury takes `penalty_bps` of the
//! seized collateral and the liquidator receives the rest.

use alloy::primitives::U256;
use serde::Serialize;

use stable_common::error::{EngineError, narrow};
use stable_common::types::{Amount, BPS_DENOMINATOR, Bps, CollateralConfig, UserPosition};

use crate::ledger::{above_liquidation_threshold, health_factor};

/// Amounts moved by one liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    /// Collateral removed from the position.
    pub seized: Amount,
    /// Debt written off by the seizure.
    pub debt_repaid: Amount,
    /// Share of `seized` sent to the treasury.
    pub penalty: Amount,
    /// Share of `seized` sent to the liquidator.
    pub to_liquidator: Amount,
}

/// Validate that `position` can be liquidated and split its collateral.
pub fn plan(
    config: &CollateralConfig,
    position: &UserPosition,
    penalty_bps: Bps,
) -> Result<Settlement, EngineError> {
    if position.collateral_amount == 0 {
        return Err(EngineError::NoCollateral);
    }
    if position.minted_amount == 0 {
        return Err(EngineError::NoDebt);
    }
    if above_liquidation_threshold(config, position.collateral_amount, position.minted_amount) {
        return Err(EngineError::PositionHealthy {
            health_factor: health_factor(position),
        });
    }

    let seized = position.collateral_amount;
    let penalty = penalty_of(seized, penalty_bps)?;

    Ok(Settlement {
        seized,
        debt_repaid: position.minted_amount,
        penalty,
        to_liquidator: seized - penalty,
    })
}

/// `seized * penalty_bps / 10_000`, rounded down.
pub fn penalty_of(seized: Amount, penalty_bps: Bps) -> Result<Amount, EngineError> {
    narrow(U256::from(seized) * U256::from(penalty_bps) / U256::from(BPS_DENOMINATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use chrono::Utc;

    fn make_config() -> CollateralConfig {
        CollateralConfig {
            is_active: true,
            deposited_total: 0,
            collateral_ratio: 15_000,
            liquidation_threshold: 12_000,
            price_source: Address::ZERO,
            stability_fee_bps: 0,
            registered_at: Utc::now(),
        }
    }

    fn make_position(collateral: Amount, minted: Amount) -> UserPosition {
        UserPosition {
            collateral_amount: collateral,
            minted_amount: minted,
            last_update_time: None,
        }
    }

    #[test]
    fn test_penalty_split() {
        let settlement = plan(&make_config(), &make_position(100, 90), 1_000).unwrap();
        assert_eq!(
            settlement,
            Settlement {
                seized: 100,
                debt_repaid: 90,
                penalty: 10,
                to_liquidator: 90,
            }
        );
    }

    #[test]
    fn test_zero_penalty() {
        let settlement = plan(&make_config(), &make_position(100, 90), 0).unwrap();
        assert_eq!(settlement.penalty, 0);
        assert_eq!(settlement.to_liquidator, 100);
    }

    #[test]
    fn test_penalty_rounds_down() {
        assert_eq!(penalty_of(99, 1_000).unwrap(), 9);
        assert_eq!(penalty_of(u128::MAX, 10_000).unwrap(), u128::MAX);
    }

    #[test]
    fn test_healthy_position_rejected() {
        // 120 / 100 = exactly the 120% threshold: not liquidatable
        let err = plan(&make_config(), &make_position(120, 100), 1_000).unwrap_err();
        assert_eq!(
            err,
            EngineError::PositionHealthy {
                health_factor: 12_000
            }
        );
        assert!(plan(&make_config(), &make_position(119, 100), 1_000).is_ok());
    }

    #[test]
    fn test_empty_positions_rejected() {
        assert_eq!(
            plan(&make_config(), &make_position(0, 100), 1_000),
            Err(EngineError::NoCollateral)
        );
        assert_eq!(
            plan(&make_config(), &make_position(100, 0), 1_000),
            Err(EngineError::NoDebt)
        );
        assert_eq!(
            plan(&make_config(), &make_position(0, 0), 1_000),
            Err(EngineError::NoCollateral)
        );
    }
}
