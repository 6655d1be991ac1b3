//! JSON scenario runner.
//!
//! A scenario is an ordered list of steps executed against a fully in-memory
//! engine (role table, settable feed, balance-map custody, manual clock).
//! Failed steps are logged and recorded in the report; they only abort the
//! run when the step declared an `expect_error` that did not match.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stable_common::access::AccessControl;
use stable_common::audit::{AuditLog, AuditRecord};
use stable_common::clock::{Clock, ManualClock};
use stable_common::config::EngineConfig;
use stable_common::error::{EngineError, FeedFault};
use stable_common::types::{Amount, Bps, Role, UserPosition};
use stable_engine::{CollateralEngine, InMemoryCustody};
use stable_oracle::{InMemoryFeed, PriceOracle};

/// Custody account used when the scenario does not name one.
pub const DEFAULT_VAULT: Address = Address::repeat_byte(0x5A);

/// Unix time the clock starts at when the scenario does not set one.
pub const DEFAULT_START_UNIX: i64 = 1_700_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Initial holder of `Role::Admin`.
    pub admin: Address,
    #[serde(default)]
    pub vault: Option<Address>,
    #[serde(default)]
    pub start_unix: Option<i64>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Substring the step's error message must contain.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    GrantRole {
        caller: Address,
        role: Role,
        account: Address,
    },
    AddFeed {
        caller: Address,
        asset: Address,
        feed: Address,
        heartbeat_secs: u64,
        decimals: u8,
    },
    /// Publish `value` on `feed`, timestamped `age_secs` before now.
    SetReading {
        feed: Address,
        value: i128,
        #[serde(default)]
        age_secs: i64,
    },
    FailFeed {
        feed: Address,
        reason: String,
    },
    SetManualPrice {
        caller: Address,
        asset: Address,
        price: u128,
    },
    AdvanceClock {
        secs: i64,
    },
    RegisterCollateral {
        caller: Address,
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
        price_source: Address,
    },
    /// Give `account` a wallet balance to deposit from.
    Fund {
        asset: Address,
        account: Address,
        amount: Amount,
    },
    Deposit {
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Withdraw {
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Mint {
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Burn {
        caller: Address,
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Liquidate {
        caller: Address,
        user: Address,
        asset: Address,
    },
    Pause {
        caller: Address,
    },
    Unpause {
        caller: Address,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::GrantRole { .. } => "grant_role",
            Action::AddFeed { .. } => "add_feed",
            Action::SetReading { .. } => "set_reading",
            Action::FailFeed { .. } => "fail_feed",
            Action::SetManualPrice { .. } => "set_manual_price",
            Action::AdvanceClock { .. } => "advance_clock",
            Action::RegisterCollateral { .. } => "register_collateral",
            Action::Fund { .. } => "fund",
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Mint { .. } => "mint",
            Action::Burn { .. } => "burn",
            Action::Liquidate { .. } => "liquidate",
            Action::Pause { .. } => "pause",
            Action::Unpause { .. } => "unpause",
        }
    }

    /// The (user, asset) position this step touches, if any.
    fn position_key(&self) -> Option<(Address, Address)> {
        match self {
            Action::Deposit { user, asset, .. }
            | Action::Withdraw { user, asset, .. }
            | Action::Mint { user, asset, .. }
            | Action::Burn { user, asset, .. }
            | Action::Liquidate { user, asset, .. } => Some((*user, *asset)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionReport {
    pub user: Address,
    pub asset: Address,
    #[serde(flatten)]
    pub position: UserPosition,
    pub health_factor: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub positions: Vec<PositionReport>,
    pub audit: Vec<AuditRecord>,
}

/// An engine plus every in-memory collaborator a scenario can drive.
pub struct Simulation {
    engine: CollateralEngine,
    oracle: Arc<PriceOracle>,
    access: Arc<AccessControl>,
    feed: Arc<InMemoryFeed>,
    custody: Arc<InMemoryCustody>,
    clock: Arc<ManualClock>,
    audit: Arc<AuditLog>,
}

impl Simulation {
    pub fn new(
        config: &EngineConfig,
        admin: Address,
        vault: Address,
        start: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let audit = Arc::new(AuditLog::new());
        let access = Arc::new(AccessControl::new(admin, audit.clone(), clock.clone()));
        let feed = Arc::new(InMemoryFeed::new());
        let custody = Arc::new(InMemoryCustody::new(vault));
        let oracle = Arc::new(PriceOracle::new(
            feed.clone(),
            access.clone(),
            clock.clone(),
            audit.clone(),
        ));
        let engine = CollateralEngine::new(
            config,
            oracle.clone(),
            custody.clone(),
            access.clone(),
            clock.clone(),
            audit.clone(),
        )?;

        Ok(Self {
            engine,
            oracle,
            access,
            feed,
            custody,
            clock,
            audit,
        })
    }

    /// Build a simulation for `scenario`, honoring its vault and start time.
    pub fn for_scenario(config: &EngineConfig, scenario: &Scenario) -> anyhow::Result<Self> {
        let start_unix = scenario.start_unix.unwrap_or(DEFAULT_START_UNIX);
        let start = DateTime::from_timestamp(start_unix, 0)
            .ok_or_else(|| anyhow::anyhow!("start_unix {start_unix} is out of range"))?;
        Self::new(
            config,
            scenario.admin,
            scenario.vault.unwrap_or(DEFAULT_VAULT),
            start,
        )
    }

    pub fn engine(&self) -> &CollateralEngine {
        &self.engine
    }

    pub fn custody(&self) -> &InMemoryCustody {
        &self.custody
    }

    /// Execute a single action.
    pub fn apply(&self, action: &Action) -> Result<(), EngineError> {
        match action {
            Action::GrantRole {
                caller,
                role,
                account,
            } => self.access.grant_role(*caller, *role, *account),
            Action::AddFeed {
                caller,
                asset,
                feed,
                heartbeat_secs,
                decimals,
            } => Ok(self
                .oracle
                .add_feed(*caller, *asset, *feed, *heartbeat_secs, *decimals)?),
            Action::SetReading {
                feed,
                value,
                age_secs,
            } => {
                let at = self.clock.now() - chrono::Duration::seconds(*age_secs);
                self.feed.set_reading(*feed, *value, at);
                Ok(())
            }
            Action::FailFeed { feed, reason } => {
                self.feed
                    .set_fault(*feed, FeedFault::Unavailable(reason.clone()));
                Ok(())
            }
            Action::SetManualPrice {
                caller,
                asset,
                price,
            } => Ok(self.oracle.set_manual_price(*caller, *asset, *price)?),
            Action::AdvanceClock { secs } => {
                self.clock.advance_secs(*secs);
                Ok(())
            }
            Action::RegisterCollateral {
                caller,
                asset,
                collateral_ratio,
                liquidation_threshold,
                price_source,
            } => self.engine.register_collateral(
                *caller,
                *asset,
                *collateral_ratio,
                *liquidation_threshold,
                *price_source,
            ),
            Action::Fund {
                asset,
                account,
                amount,
            } => {
                self.custody.fund(*asset, *account, *amount);
                Ok(())
            }
            Action::Deposit {
                caller,
                user,
                asset,
                amount,
            } => self.engine.deposit(*caller, *user, *asset, *amount),
            Action::Withdraw {
                caller,
                user,
                asset,
                amount,
            } => self.engine.withdraw(*caller, *user, *asset, *amount),
            Action::Mint {
                caller,
                user,
                asset,
                amount,
            } => self.engine.record_mint(*caller, *user, *asset, *amount),
            Action::Burn {
                caller,
                user,
                asset,
                amount,
            } => self.engine.record_burn(*caller, *user, *asset, *amount),
            Action::Liquidate {
                caller,
                user,
                asset,
            } => self.engine.liquidate(*caller, *user, *asset).map(|_| ()),
            Action::Pause { caller } => self.engine.pause(*caller),
            Action::Unpause { caller } => self.engine.unpause(*caller),
        }
    }

    /// Run every step in order and collect the report.
    pub fn run(&self, scenario: &Scenario) -> anyhow::Result<Report> {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut touched = BTreeSet::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            let name = step.action.name();
            let result = self.apply(&step.action);

            match (&result, &step.expect_error) {
                (Ok(()), None) => {
                    tracing::info!(step = index, action = name, "Step succeeded");
                }
                (Err(e), None) => {
                    tracing::warn!(step = index, action = name, error = %e, kind = ?e.kind(), "Step failed");
                }
                (Err(e), Some(expected)) if e.to_string().contains(expected.as_str()) => {
                    tracing::info!(step = index, action = name, error = %e, "Step failed as expected");
                }
                (Err(e), Some(expected)) => {
                    anyhow::bail!("step {index} ({name}): expected error containing {expected:?}, got {e}");
                }
                (Ok(()), Some(expected)) => {
                    anyhow::bail!("step {index} ({name}): expected error containing {expected:?}, but it succeeded");
                }
            }

            if let Some(key) = step.action.position_key() {
                touched.insert(key);
            }
            steps.push(StepOutcome {
                index,
                action: name,
                ok: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        let positions = touched
            .into_iter()
            .map(|(user, asset)| PositionReport {
                user,
                asset,
                position: self.engine.position(user, asset),
                health_factor: self.engine.health_factor(user, asset),
            })
            .collect();

        Ok(Report {
            steps,
            positions,
            audit: self.audit.records(),
        })
    }
}
