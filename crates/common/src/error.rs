use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::types::{Amount, Bps, Lifecycle, Role};

/// Coarse failure classes used by callers to decide whether and when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks the required role. Never retried.
    Authorization,
    /// Malformed input or configuration. Caller must correct it.
    Validation,
    /// Position economics forbid the operation right now.
    Economic,
    /// Price could not be resolved. Recoverable once a feed or fallback is refreshed.
    Oracle,
    /// Engine is paused or an operation is already in flight.
    Lifecycle,
    /// External custody refused a transfer.
    Custody,
    /// Arithmetic limits were exceeded.
    Internal,
}

/// Failure reported by an upstream price feed call (as opposed to a bad reading).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedFault {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Feed call reverted: {0}")]
    Reverted(String),

    #[error("No reading published for feed {0}")]
    NoReading(Address),
}

/// Price oracle adapter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Caller {caller} lacks role {role}")]
    Unauthorized { caller: Address, role: Role },

    #[error("No price feed registered for {0}")]
    UnknownFeed(Address),

    #[error("Price feed for {0} already registered")]
    DuplicateFeed(Address),

    #[error("Price feed for {0} is inactive")]
    OracleInactive(Address),

    #[error("Invalid price {value} reported for {asset}")]
    InvalidPrice { asset: Address, value: i128 },

    #[error("Stale price for {asset}: reading is {age_secs}s old, heartbeat is {heartbeat_secs}s")]
    StalePrice {
        asset: Address,
        age_secs: i64,
        heartbeat_secs: u64,
    },

    #[error("Primary feed failed for {asset} and no fallback price is set")]
    NoFallbackPrice { asset: Address, fault: FeedFault },

    #[error("Price for {0} overflows when rescaled")]
    PriceOverflow(Address),

    #[error("Heartbeat must be greater than zero")]
    InvalidHeartbeat,

    #[error("Feed decimals {decimals} exceed maximum {max}")]
    InvalidDecimals { decimals: u8, max: u8 },
}

/// Failure reported by the external custody collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("Insufficient balance of {asset} for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        asset: Address,
        account: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Collateral engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Caller {caller} lacks role {role}")]
    Unauthorized { caller: Address, role: Role },

    #[error("Engine is paused")]
    Paused,

    #[error("Reentrant call rejected")]
    Reentrancy,

    #[error("Engine is already {0}")]
    AlreadyInState(Lifecycle),

    #[error("Admin {0} cannot revoke its own admin role")]
    SelfRevocation(Address),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Collateral {0} is already registered and active")]
    DuplicateAsset(Address),

    #[error("Collateral {0} is not registered")]
    UnknownAsset(Address),

    #[error("Collateral ratio {collateral_ratio} must exceed liquidation threshold {liquidation_threshold}")]
    InvalidRatios {
        collateral_ratio: Bps,
        liquidation_threshold: Bps,
    },

    #[error("Liquidation threshold {0} is below 100%")]
    ThresholdTooLow(Bps),

    #[error("Stability fee {fee} exceeds maximum {max}")]
    FeeTooHigh { fee: Bps, max: Bps },

    #[error("Liquidation penalty {penalty} exceeds maximum {max}")]
    PenaltyTooHigh { penalty: Bps, max: Bps },

    #[error("Collateral {0} is not accepting deposits or mints")]
    UnsupportedAsset(Address),

    #[error("Insufficient collateral: have {available}, requested {requested}")]
    InsufficientCollateral { available: Amount, requested: Amount },

    #[error("Withdrawal would leave the position below the collateral ratio")]
    RatioViolation,

    #[error("Burn of {requested} exceeds outstanding debt {outstanding}")]
    ExcessBurn { requested: Amount, outstanding: Amount },

    #[error("Position has no collateral")]
    NoCollateral,

    #[error("Position has no debt")]
    NoDebt,

    #[error("Position is healthy (health factor {health_factor})")]
    PositionHealthy { health_factor: u128 },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Arithmetic overflow")]
    Overflow,
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Unauthorized { .. } => ErrorKind::Authorization,
            OracleError::DuplicateFeed(_)
            | OracleError::InvalidHeartbeat
            | OracleError::InvalidDecimals { .. } => ErrorKind::Validation,
            OracleError::UnknownFeed(_)
            | OracleError::OracleInactive(_)
            | OracleError::InvalidPrice { .. }
            | OracleError::StalePrice { .. }
            | OracleError::NoFallbackPrice { .. }
            | OracleError::PriceOverflow(_) => ErrorKind::Oracle,
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Unauthorized { .. } => ErrorKind::Authorization,
            EngineError::Paused | EngineError::Reentrancy => ErrorKind::Lifecycle,
            EngineError::AlreadyInState(_)
            | EngineError::SelfRevocation(_)
            | EngineError::ZeroAmount
            | EngineError::DuplicateAsset(_)
            | EngineError::UnknownAsset(_)
            | EngineError::InvalidRatios { .. }
            | EngineError::ThresholdTooLow(_)
            | EngineError::FeeTooHigh { .. }
            | EngineError::PenaltyTooHigh { .. } => ErrorKind::Validation,
            EngineError::UnsupportedAsset(_)
            | EngineError::InsufficientCollateral { .. }
            | EngineError::RatioViolation
            | EngineError::ExcessBurn { .. }
            | EngineError::NoCollateral
            | EngineError::NoDebt
            | EngineError::PositionHealthy { .. } => ErrorKind::Economic,
            EngineError::Oracle(e) => e.kind(),
            EngineError::Custody(_) => ErrorKind::Custody,
            EngineError::Overflow => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call can succeed once external conditions change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Economic | ErrorKind::Oracle | ErrorKind::Lifecycle
        )
    }
}

/// Narrow a wide intermediate back into an `Amount`.
pub fn narrow(value: U256) -> Result<Amount, EngineError> {
    Amount::try_from(value).map_err(|_| EngineError::Overflow)
}
