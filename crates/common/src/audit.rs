//! Audit trail of every administrative and state-mutating operation.
//!
//! Each successful operation appends one `AuditRecord`. Records are kept
//! in-memory in append order; the hosting ledger is responsible for
//! persisting them alongside its own state.

use std::sync::Mutex;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Amount, Bps, Lifecycle, QuoteSource, Role};

/// Auditable state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // Access / lifecycle
    RoleGranted {
        role: Role,
        account: Address,
        by: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        by: Address,
    },
    LifecycleChanged {
        state: Lifecycle,
        by: Address,
    },

    // Oracle administration
    FeedAdded {
        asset: Address,
        feed: Address,
        heartbeat_secs: u64,
        decimals: u8,
    },
    ManualPriceSet {
        asset: Address,
        price: u128,
    },
    HeartbeatUpdated {
        asset: Address,
        heartbeat_secs: u64,
    },
    FeedActivityChanged {
        asset: Address,
        active: bool,
    },

    // Registry administration
    CollateralRegistered {
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
        price_source: Address,
    },
    RatiosUpdated {
        asset: Address,
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
    },
    StabilityFeeUpdated {
        asset: Address,
        fee_bps: Bps,
    },
    CollateralActivityChanged {
        asset: Address,
        active: bool,
    },
    LiquidationPenaltyUpdated {
        penalty_bps: Bps,
    },

    // Positions
    CollateralDeposited {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    CollateralWithdrawn {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    DebtMinted {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    DebtBurned {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    PositionLiquidated {
        user: Address,
        asset: Address,
        liquidator: Address,
        seized: Amount,
        debt_repaid: Amount,
        penalty: Amount,
        price: u128,
        price_source: QuoteSource,
    },
}

/// One appended audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub event: AuditEvent,
}

/// Append-only audit log shared by the oracle and the engine.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: AuditEvent, recorded_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        tracing::debug!(audit_id = %id, event = ?event, "Audit record appended");
        self.lock().push(AuditRecord {
            id,
            recorded_at,
            event,
        });
        id
    }

    /// Snapshot of all records in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn last(&self) -> Option<AuditRecord> {
        self.lock().last().cloned()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&*self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_kept_in_order() {
        let log = AuditLog::new();
        let now = Utc::now();
        log.record(
            AuditEvent::LiquidationPenaltyUpdated { penalty_bps: 500 },
            now,
        );
        log.record(
            AuditEvent::LifecycleChanged {
                state: Lifecycle::Paused,
                by: Address::ZERO,
            },
            now,
        );

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert!(matches!(
            records[0].event,
            AuditEvent::LiquidationPenaltyUpdated { penalty_bps: 500 }
        ));
        assert!(matches!(
            log.last().unwrap().event,
            AuditEvent::LifecycleChanged { .. }
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AuditEvent::CollateralDeposited {
            user: Address::repeat_byte(0x11),
            asset: Address::repeat_byte(0x22),
            amount: 200,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "collateral_deposited");
        assert_eq!(json["amount"], 200);
    }
}
