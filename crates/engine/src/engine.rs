//! Collateral engine: entry point for every position operation.
//!
//! Each mutating call runs the same pipeline:
//! 1. Authorization (`AuthorizationProvider`) and lifecycle (pause) checks
//! 2. Claim the reentrancy guard for the whole operation
//! 3. Validate against the registry, resolving a price if debt is involved
//! 4. Update internal accounting
//! 5. Call out to custody (deposit pulls first, withdraw/liquidate release last)
//!
//! The state lock is never held across an oracle or custody call. If a
//! release fails after accounting was updated, the previous accounting is
//! restored before the error is returned.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;

use stable_common::access::{AuthorizationProvider, require_role};
use stable_common::audit::{AuditEvent, AuditLog};
use stable_common::clock::Clock;
use stable_common::config::EngineConfig;
use stable_common::error::EngineError;
use stable_common::types::{
    Amount, Bps, CollateralConfig, Lifecycle, MAX_LIQUIDATION_PENALTY_BPS, MAX_STABILITY_FEE_BPS,
    PriceQuote, Role, UserPosition,
};
use stable_oracle::PriceOracle;
use stable_oracle::scaling::value_of;

use crate::custody::Custody;
use crate::ledger::{self, PositionLedger};
use crate::lifecycle;
use crate::liquidation::{self, Settlement};
use crate::reentrancy::{InFlight, ReentrancyGuard};
use crate::registry::CollateralRegistry;

/// Mutable engine state, guarded by a single lock.
#[derive(Debug)]
struct EngineState {
    registry: CollateralRegistry,
    ledger: PositionLedger,
    lifecycle: Lifecycle,
    liquidation_penalty_bps: Bps,
    default_stability_fee_bps: Bps,
}

pub struct CollateralEngine {
    state: Mutex<EngineState>,
    guard: ReentrancyGuard,
    treasury: Address,
    oracle: Arc<PriceOracle>,
    custody: Arc<dyn Custody>,
    auth: Arc<dyn AuthorizationProvider>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLog>,
}

impl CollateralEngine {
    pub fn new(
        config: &EngineConfig,
        oracle: Arc<PriceOracle>,
        custody: Arc<dyn Custody>,
        auth: Arc<dyn AuthorizationProvider>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLog>,
    ) -> Result<Self, EngineError> {
        check_penalty(config.liquidation_penalty_bps)?;
        if config.default_stability_fee_bps > MAX_STABILITY_FEE_BPS {
            return Err(EngineError::FeeTooHigh {
                fee: config.default_stability_fee_bps,
                max: MAX_STABILITY_FEE_BPS,
            });
        }

        tracing::info!(
            treasury = %config.treasury,
            liquidation_penalty_bps = config.liquidation_penalty_bps,
            state = %config.initial_state,
            "Collateral engine initialized"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                registry: CollateralRegistry::new(),
                ledger: PositionLedger::new(),
                lifecycle: config.initial_state,
                liquidation_penalty_bps: config.liquidation_penalty_bps,
                default_stability_fee_bps: config.default_stability_fee_bps,
            }),
            guard: ReentrancyGuard::new(),
            treasury: config.treasury,
            oracle,
            custody,
            auth,
            clock,
            audit,
        })
    }

    // ─────────────────────────── lifecycle ───────────────────────────

    pub fn pause(&self, caller: Address) -> Result<(), EngineError> {
        self.set_lifecycle(caller, Lifecycle::Paused)
    }

    pub fn unpause(&self, caller: Address) -> Result<(), EngineError> {
        self.set_lifecycle(caller, Lifecycle::Active)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    fn set_lifecycle(&self, caller: Address, target: Lifecycle) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Admin)?;
        {
            let mut state = self.state();
            state.lifecycle = lifecycle::transition(state.lifecycle, target)?;
        }

        tracing::warn!(state = %target, by = %caller, "Engine lifecycle changed");
        self.record(AuditEvent::LifecycleChanged {
            state: target,
            by: caller,
        });
        Ok(())
    }

    // ─────────────────────────── registry admin ───────────────────────────

    pub fn register_collateral(
        &self,
        caller: Address,
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
        price_source: Address,
    ) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Manager)?;
        let now = self.clock.now();
        {
            let mut state = self.state();
            let fee = state.default_stability_fee_bps;
            state.registry.register(
                asset,
                collateral_ratio,
                liquidation_threshold,
                price_source,
                fee,
                now,
            )?;
        }

        tracing::info!(
            asset = %asset,
            collateral_ratio,
            liquidation_threshold,
            price_source = %price_source,
            "Collateral registered"
        );
        self.record(AuditEvent::CollateralRegistered {
            asset,
            collateral_ratio,
            liquidation_threshold,
            price_source,
        });
        Ok(())
    }

    pub fn update_ratios(
        &self,
        caller: Address,
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
    ) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Manager)?;
        self.state()
            .registry
            .update_ratios(asset, collateral_ratio, liquidation_threshold)?;

        tracing::info!(asset = %asset, collateral_ratio, liquidation_threshold, "Collateral ratios updated");
        self.record(AuditEvent::RatiosUpdated {
            asset,
            collateral_ratio,
            liquidation_threshold,
        });
        Ok(())
    }

    pub fn update_stability_fee(
        &self,
        caller: Address,
        asset: Address,
        fee_bps: Bps,
    ) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Manager)?;
        self.state().registry.update_stability_fee(asset, fee_bps)?;

        tracing::info!(asset = %asset, fee_bps, "Stability fee updated");
        self.record(AuditEvent::StabilityFeeUpdated { asset, fee_bps });
        Ok(())
    }

    /// Deactivate or reactivate an asset. Deactivation blocks new deposits
    /// and mints; withdrawals, burns and liquidations continue.
    pub fn set_collateral_active(
        &self,
        caller: Address,
        asset: Address,
        active: bool,
    ) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Manager)?;
        self.state().registry.set_active(asset, active)?;

        tracing::info!(asset = %asset, active, "Collateral activity changed");
        self.record(AuditEvent::CollateralActivityChanged { asset, active });
        Ok(())
    }

    pub fn update_liquidation_penalty(
        &self,
        caller: Address,
        penalty_bps: Bps,
    ) -> Result<(), EngineError> {
        require_role(self.auth.as_ref(), caller, Role::Manager)?;
        check_penalty(penalty_bps)?;
        self.state().liquidation_penalty_bps = penalty_bps;

        tracing::info!(penalty_bps, "Liquidation penalty updated");
        self.record(AuditEvent::LiquidationPenaltyUpdated { penalty_bps });
        Ok(())
    }

    // ─────────────────────────── positions ───────────────────────────

    /// Pull `amount` of `asset` from `user` into custody, then credit the position.
    pub fn deposit(
        &self,
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let _in_flight = self.enter(caller, Role::Operator)?;

        {
            let state = self.state();
            let config = state.registry.active(asset)?;
            if amount == 0 {
                return Err(EngineError::ZeroAmount);
            }
            config
                .deposited_total
                .checked_add(amount)
                .ok_or(EngineError::Overflow)?;
            let position = state.ledger.get(user, asset);
            position
                .collateral_amount
                .checked_add(amount)
                .ok_or(EngineError::Overflow)?;
        }

        self.custody.transfer_in(asset, user, amount)?;

        let position = {
            let mut state = self.state();
            state.registry.credit(asset, amount)?;
            let position = state.ledger.get(user, asset);
            state.ledger.put(
                user,
                asset,
                position.collateral_amount + amount,
                position.minted_amount,
                self.clock.now(),
            );
            state.ledger.get(user, asset)
        };

        tracing::info!(
            user = %user,
            asset = %asset,
            amount,
            collateral = position.collateral_amount,
            "Collateral deposited"
        );
        self.record(AuditEvent::CollateralDeposited {
            user,
            asset,
            amount,
        });
        Ok(())
    }

    /// Debit the position, then release `amount` of `asset` to `user`.
    pub fn withdraw(
        &self,
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let _in_flight = self.enter(caller, Role::Operator)?;

        let (config, before) = {
            let state = self.state();
            let config = state.registry.registered(asset)?.clone();
            (config, state.ledger.get(user, asset))
        };
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if amount > before.collateral_amount {
            return Err(EngineError::InsufficientCollateral {
                available: before.collateral_amount,
                requested: amount,
            });
        }

        let remaining = before.collateral_amount - amount;
        if before.minted_amount > 0 {
            self.price(&config)?;
            if !ledger::meets_mint_ratio(&config, remaining, before.minted_amount) {
                tracing::debug!(
                    user = %user,
                    asset = %asset,
                    amount,
                    remaining,
                    debt = before.minted_amount,
                    "Withdrawal rejected by collateral ratio"
                );
                return Err(EngineError::RatioViolation);
            }
        }

        {
            let mut state = self.state();
            state.registry.debit(asset, amount)?;
            state
                .ledger
                .put(user, asset, remaining, before.minted_amount, self.clock.now());
        }

        if let Err(err) = self.custody.transfer_out(asset, user, amount) {
            tracing::error!(user = %user, asset = %asset, amount, error = %err, "Release failed, restoring position");
            let mut state = self.state();
            state.registry.credit(asset, amount)?;
            state.ledger.restore(user, asset, before);
            return Err(err.into());
        }

        tracing::info!(user = %user, asset = %asset, amount, remaining, "Collateral withdrawn");
        self.record(AuditEvent::CollateralWithdrawn {
            user,
            asset,
            amount,
        });
        Ok(())
    }

    /// Record debt issued by the minting collaborator against `user`'s collateral.
    pub fn record_mint(
        &self,
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let _in_flight = self.enter(caller, Role::Minter)?;

        let (config, position) = {
            let state = self.state();
            let config = state.registry.active(asset)?.clone();
            (config, state.ledger.get(user, asset))
        };
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let minted = position
            .minted_amount
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;

        self.price(&config)?;
        if !ledger::meets_mint_ratio(&config, position.collateral_amount, minted) {
            return Err(EngineError::InsufficientCollateral {
                available: position.collateral_amount,
                requested: ledger::required_collateral(minted, config.collateral_ratio)?,
            });
        }

        self.state()
            .ledger
            .put(user, asset, position.collateral_amount, minted, self.clock.now());

        tracing::info!(user = %user, asset = %asset, amount, debt = minted, "Debt recorded");
        self.record(AuditEvent::DebtMinted {
            user,
            asset,
            amount,
        });
        Ok(())
    }

    /// Record debt redeemed by the minting collaborator. Never needs a price:
    /// burning can only improve the ratio.
    pub fn record_burn(
        &self,
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let _in_flight = self.enter(caller, Role::Minter)?;

        let mut state = self.state();
        state.registry.registered(asset)?;
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let position = state.ledger.get(user, asset);
        if amount > position.minted_amount {
            return Err(EngineError::ExcessBurn {
                requested: amount,
                outstanding: position.minted_amount,
            });
        }
        let minted = position.minted_amount - amount;
        state
            .ledger
            .put(user, asset, position.collateral_amount, minted, self.clock.now());
        drop(state);

        tracing::info!(user = %user, asset = %asset, amount, debt = minted, "Debt burned");
        self.record(AuditEvent::DebtBurned {
            user,
            asset,
            amount,
        });
        Ok(())
    }

    /// Seize an undercollateralized position. The treasury receives the
    /// penalty share and the caller receives the remainder.
    pub fn liquidate(
        &self,
        caller: Address,
        user: Address,
        asset: Address,
    ) -> Result<Settlement, EngineError> {
        let _in_flight = self.enter(caller, Role::Liquidator)?;

        let (config, before, penalty_bps) = {
            let state = self.state();
            let config = state.registry.registered(asset)?.clone();
            (
                config,
                state.ledger.get(user, asset),
                state.liquidation_penalty_bps,
            )
        };
        let settlement = liquidation::plan(&config, &before, penalty_bps)?;
        let quote = self.price(&config)?;

        {
            let mut state = self.state();
            state.registry.debit(asset, settlement.seized)?;
            state.ledger.put(user, asset, 0, 0, self.clock.now());
        }

        if let Err(err) = self.pay_out(asset, caller, &settlement) {
            tracing::error!(user = %user, asset = %asset, error = %err, "Liquidation payout failed, restoring position");
            let mut state = self.state();
            state.registry.credit(asset, settlement.seized)?;
            state.ledger.restore(user, asset, before);
            return Err(err);
        }

        tracing::warn!(
            user = %user,
            asset = %asset,
            liquidator = %caller,
            seized = settlement.seized,
            debt_repaid = settlement.debt_repaid,
            penalty = settlement.penalty,
            "Position liquidated"
        );
        self.record(AuditEvent::PositionLiquidated {
            user,
            asset,
            liquidator: caller,
            seized: settlement.seized,
            debt_repaid: settlement.debt_repaid,
            penalty: settlement.penalty,
            price: quote.price,
            price_source: quote.source,
        });
        Ok(settlement)
    }

    /// Release the penalty to the treasury and the rest to the liquidator
    /// in one custody call.
    fn pay_out(
        &self,
        asset: Address,
        liquidator: Address,
        settlement: &Settlement,
    ) -> Result<(), EngineError> {
        let legs: Vec<(Address, Amount)> = [
            (self.treasury, settlement.penalty),
            (liquidator, settlement.to_liquidator),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .collect();
        if legs.is_empty() {
            return Ok(());
        }
        self.custody.transfer_out_batch(asset, &legs)?;
        Ok(())
    }

    // ─────────────────────────── queries ───────────────────────────

    pub fn position(&self, user: Address, asset: Address) -> UserPosition {
        self.state().ledger.get(user, asset)
    }

    /// `collateral * 10_000 / debt`; `u128::MAX` for debt-free positions.
    pub fn health_factor(&self, user: Address, asset: Address) -> u128 {
        ledger::health_factor(&self.position(user, asset))
    }

    pub fn meets_mint_ratio(
        &self,
        asset: Address,
        collateral: Amount,
        debt: Amount,
    ) -> Result<bool, EngineError> {
        let state = self.state();
        let config = state.registry.registered(asset)?;
        Ok(ledger::meets_mint_ratio(config, collateral, debt))
    }

    pub fn above_liquidation_threshold(
        &self,
        asset: Address,
        collateral: Amount,
        debt: Amount,
    ) -> Result<bool, EngineError> {
        let state = self.state();
        let config = state.registry.registered(asset)?;
        Ok(ledger::above_liquidation_threshold(config, collateral, debt))
    }

    /// Whether `liquidate` would pass its position checks right now.
    pub fn is_liquidatable(&self, user: Address, asset: Address) -> bool {
        let state = self.state();
        let Some(config) = state.registry.get(asset) else {
            return false;
        };
        let position = state.ledger.get(user, asset);
        position.collateral_amount > 0
            && position.minted_amount > 0
            && !ledger::above_liquidation_threshold(
                config,
                position.collateral_amount,
                position.minted_amount,
            )
    }

    /// Users holding debt against `asset` that are currently below threshold.
    pub fn liquidatable_positions(&self, asset: Address) -> Vec<(Address, UserPosition)> {
        let state = self.state();
        let Some(config) = state.registry.get(asset) else {
            return Vec::new();
        };
        state
            .ledger
            .indebted(asset)
            .into_iter()
            .filter(|(_, p)| {
                p.collateral_amount > 0
                    && !ledger::above_liquidation_threshold(
                        config,
                        p.collateral_amount,
                        p.minted_amount,
                    )
            })
            .collect()
    }

    /// USD value (8 decimals) of the position's collateral at the current price.
    pub fn collateral_value_usd(&self, user: Address, asset: Address) -> Result<u128, EngineError> {
        let (config, position) = {
            let state = self.state();
            let config = state.registry.registered(asset)?.clone();
            (config, state.ledger.get(user, asset))
        };
        let quote = self.price(&config)?;
        value_of(position.collateral_amount, quote.price).ok_or(EngineError::Overflow)
    }

    /// Sum of deposited collateral units across active assets.
    pub fn total_collateral_value(&self) -> Result<Amount, EngineError> {
        self.state().registry.total_collateral_value()
    }

    /// Sum of all users' collateral for `asset`, recomputed from positions.
    pub fn position_collateral_sum(&self, asset: Address) -> Amount {
        self.state().ledger.collateral_sum(asset)
    }

    pub fn collateral_config(&self, asset: Address) -> Option<CollateralConfig> {
        self.state().registry.get(asset).cloned()
    }

    pub fn registered_assets(&self) -> Vec<Address> {
        self.state().registry.assets().to_vec()
    }

    pub fn liquidation_penalty_bps(&self) -> Bps {
        self.state().liquidation_penalty_bps
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn oracle(&self) -> &PriceOracle {
        &self.oracle
    }

    // ─────────────────────────── internals ───────────────────────────

    /// Authorization, pause and reentrancy checks shared by position operations.
    fn enter(&self, caller: Address, role: Role) -> Result<InFlight<'_>, EngineError> {
        require_role(self.auth.as_ref(), caller, role)?;
        lifecycle::ensure_active(self.lifecycle())?;
        self.guard.enter()
    }

    fn price(&self, config: &CollateralConfig) -> Result<PriceQuote, EngineError> {
        Ok(self.oracle.get_price(config.price_source)?)
    }

    fn record(&self, event: AuditEvent) {
        self.audit.record(event, self.clock.now());
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_penalty(penalty_bps: Bps) -> Result<(), EngineError> {
    if penalty_bps > MAX_LIQUIDATION_PENALTY_BPS {
        return Err(EngineError::PenaltyTooHigh {
            penalty: penalty_bps,
            max: MAX_LIQUIDATION_PENALTY_BPS,
        });
    }
    Ok(())
}
