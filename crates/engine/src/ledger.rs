//! Position ledger and collateral-ratio arithmetic.
//!
//! Ratios compare raw collateral units against debt units; prices never
//! enter these formulas. All products are taken in `U256` so that
//! `amount * bps` is exact for every `u128` amount.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};

use stable_common::error::{EngineError, narrow};
use stable_common::types::{
    Amount, BPS_DENOMINATOR, Bps, CollateralConfig, MAX_HEALTH_FACTOR, SATURATED_HEALTH_FACTOR,
    UserPosition,
};

/// `collateral / debt >= ratio_bps / 10_000`, evaluated without rounding.
/// Zero debt is always covered.
pub fn covers(collateral: Amount, debt: Amount, ratio_bps: Bps) -> bool {
    debt == 0
        || U256::from(collateral) * U256::from(BPS_DENOMINATOR)
            >= U256::from(debt) * U256::from(ratio_bps)
}

/// Whether `collateral` is enough to carry `debt` at the asset's minting ratio.
pub fn meets_mint_ratio(config: &CollateralConfig, collateral: Amount, debt: Amount) -> bool {
    covers(collateral, debt, config.collateral_ratio)
}

/// Whether the position is at or above the asset's liquidation threshold.
pub fn above_liquidation_threshold(
    config: &CollateralConfig,
    collateral: Amount,
    debt: Amount,
) -> bool {
    covers(collateral, debt, config.liquidation_threshold)
}

/// `collateral * 10_000 / debt`, or `MAX_HEALTH_FACTOR` without debt.
///
/// Indebted positions whose ratio does not fit in `u128` report
/// `SATURATED_HEALTH_FACTOR`, so `MAX_HEALTH_FACTOR` always means debt-free.
pub fn health_factor(position: &UserPosition) -> u128 {
    if position.minted_amount == 0 {
        return MAX_HEALTH_FACTOR;
    }
    let ratio = U256::from(position.collateral_amount) * U256::from(BPS_DENOMINATOR)
        / U256::from(position.minted_amount);
    u128::try_from(ratio).unwrap_or(SATURATED_HEALTH_FACTOR)
}

/// Smallest collateral amount that covers `debt` at `ratio_bps` (rounded up).
pub fn required_collateral(debt: Amount, ratio_bps: Bps) -> Result<Amount, EngineError> {
    let denominator = U256::from(BPS_DENOMINATOR);
    let product = U256::from(debt) * U256::from(ratio_bps);
    narrow((product + denominator - U256::from(1u8)) / denominator)
}

/// Per-(user, asset) positions. Missing entries read as an empty position.
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: HashMap<(Address, Address), UserPosition>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: Address, asset: Address) -> UserPosition {
        self.positions
            .get(&(user, asset))
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite a position, stamping `last_update_time`.
    pub fn put(
        &mut self,
        user: Address,
        asset: Address,
        collateral_amount: Amount,
        minted_amount: Amount,
        now: DateTime<Utc>,
    ) {
        self.positions.insert(
            (user, asset),
            UserPosition {
                collateral_amount,
                minted_amount,
                last_update_time: Some(now),
            },
        );
    }

    /// Restore a previously read position verbatim.
    pub fn restore(&mut self, user: Address, asset: Address, position: UserPosition) {
        self.positions.insert((user, asset), position);
    }

    /// Sum of collateral across all users for `asset`.
    pub fn collateral_sum(&self, asset: Address) -> Amount {
        self.positions
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, p)| p.collateral_amount)
            .sum()
    }

    /// All (user, position) pairs for `asset` with outstanding debt.
    pub fn indebted(&self, asset: Address) -> Vec<(Address, UserPosition)> {
        let mut out: Vec<_> = self
            .positions
            .iter()
            .filter(|((_, a), p)| *a == asset && p.minted_amount > 0)
            .map(|((user, _), p)| (*user, *p))
            .collect();
        out.sort_by_key(|(user, _)| *user);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address::repeat_byte(0xA1);
    const BOB: Address = Address::repeat_byte(0xB0);
    const WETH: Address = Address::repeat_byte(0xE1);

    fn make_config(collateral_ratio: Bps, liquidation_threshold: Bps) -> CollateralConfig {
        CollateralConfig {
            is_active: true,
            deposited_total: 0,
            collateral_ratio,
            liquidation_threshold,
            price_source: WETH,
            stability_fee_bps: 0,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_zero_debt_always_covered() {
        let config = make_config(15_000, 12_000);
        assert!(meets_mint_ratio(&config, 0, 0));
        assert!(above_liquidation_threshold(&config, 0, 0));
    }

    #[test]
    fn test_mint_ratio_boundary() {
        let config = make_config(15_000, 12_000);
        // 150 collateral carries exactly 100 debt at 150%
        assert!(meets_mint_ratio(&config, 150, 100));
        assert!(!meets_mint_ratio(&config, 149, 100));
        assert!(meets_mint_ratio(&config, 200, 133));
        assert!(!meets_mint_ratio(&config, 200, 140));
    }

    #[test]
    fn test_threshold_is_exact_not_floored() {
        let config = make_config(15_000, 12_000);
        // 3 * 1.2 = 3.6; 3 units of collateral do not cover it
        assert!(!above_liquidation_threshold(&config, 3, 3));
        assert!(above_liquidation_threshold(&config, 4, 3));
    }

    #[test]
    fn test_no_overflow_on_large_amounts() {
        assert!(covers(u128::MAX, u128::MAX, 10_000));
        assert!(!covers(u128::MAX, u128::MAX, 10_001));
    }

    #[test]
    fn test_health_factor() {
        let mut position = UserPosition::default();
        assert_eq!(health_factor(&position), MAX_HEALTH_FACTOR);

        position.collateral_amount = 200;
        position.minted_amount = 100;
        assert_eq!(health_factor(&position), 20_000);

        position.collateral_amount = 0;
        assert_eq!(health_factor(&position), 0);
    }

    #[test]
    fn test_health_factor_saturates_below_debt_free_value() {
        let position = UserPosition {
            collateral_amount: u128::MAX,
            minted_amount: 1,
            last_update_time: None,
        };
        assert_eq!(health_factor(&position), SATURATED_HEALTH_FACTOR);
        assert_ne!(health_factor(&position), MAX_HEALTH_FACTOR);
    }

    #[test]
    fn test_required_collateral_rounds_up() {
        assert_eq!(required_collateral(100, 15_000).unwrap(), 150);
        assert_eq!(required_collateral(3, 12_000).unwrap(), 4);
        assert_eq!(required_collateral(0, 15_000).unwrap(), 0);
    }

    #[test]
    fn test_ledger_lazy_positions() {
        let mut ledger = PositionLedger::new();
        assert!(ledger.get(ALICE, WETH).is_empty());

        let now = Utc::now();
        ledger.put(ALICE, WETH, 200, 100, now);
        ledger.put(BOB, WETH, 50, 0, now);

        let alice = ledger.get(ALICE, WETH);
        assert_eq!(alice.collateral_amount, 200);
        assert_eq!(alice.minted_amount, 100);
        assert_eq!(alice.last_update_time, Some(now));

        assert_eq!(ledger.collateral_sum(WETH), 250);
        assert_eq!(ledger.indebted(WETH), vec![(ALICE, alice)]);
    }

    #[test]
    fn test_restore_keeps_original_timestamp() {
        let mut ledger = PositionLedger::new();
        let before = UserPosition::default();
        ledger.put(ALICE, WETH, 10, 0, Utc::now());
        ledger.restore(ALICE, WETH, before);
        assert_eq!(ledger.get(ALICE, WETH), before);
    }
}
