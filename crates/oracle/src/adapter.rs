//! Price oracle adapter.
//!
//! Resolution pipeline for `get_price(asset)`:
//! 1. The asset's feed must be registered and active
//! 2. Primary: query the upstream feed and judge the reading (positive, fresh)
//! 3. Fallback: only if the upstream call failed, use the manual price
//!
//! A reading that is present but bad (non-positive, stale) fails the lookup
//! outright. The fallback exists for feed outages, not for bad data.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use stable_common::access::AuthorizationProvider;
use stable_common::audit::{AuditEvent, AuditLog};
use stable_common::clock::Clock;
use stable_common::error::{FeedFault, OracleError};
use stable_common::types::{MAX_FEED_DECIMALS, PriceFeedConfig, PriceQuote, QuoteSource, Role};

use crate::feed::PriceFeed;
use crate::scaling::to_price_decimals;

/// Why the primary step did not produce a quote.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PrimaryFault {
    /// The upstream call itself failed; the fallback may be consulted.
    Upstream(FeedFault),
    /// The upstream answered with an unusable reading; fatal.
    Rejected(OracleError),
}

/// USD price oracle with staleness guard and manual fallback.
pub struct PriceOracle {
    feeds: RwLock<HashMap<Address, PriceFeedConfig>>,
    upstream: Arc<dyn PriceFeed>,
    auth: Arc<dyn AuthorizationProvider>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLog>,
}

impl PriceOracle {
    pub fn new(
        upstream: Arc<dyn PriceFeed>,
        auth: Arc<dyn AuthorizationProvider>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            upstream,
            auth,
            clock,
            audit,
        }
    }

    /// Resolve the current USD price of `asset` (8 decimals).
    pub fn get_price(&self, asset: Address) -> Result<PriceQuote, OracleError> {
        let config = self.active_config(asset)?;
        let now = self.clock.now();

        match self.try_primary(asset, &config, now) {
            Ok(quote) => Ok(quote),
            Err(PrimaryFault::Rejected(err)) => {
                tracing::debug!(asset = %asset, error = %err, "Primary price rejected");
                Err(err)
            }
            Err(PrimaryFault::Upstream(fault)) => self.try_fallback(asset, &config, fault, now),
        }
    }

    /// Advisory freshness check: `true` only when the primary feed currently
    /// yields a valid, fresh reading. Never errors; a fallback price does not
    /// count as fresh.
    pub fn is_price_fresh(&self, asset: Address) -> bool {
        let Ok(config) = self.active_config(asset) else {
            return false;
        };
        self.try_primary(asset, &config, self.clock.now()).is_ok()
    }

    /// Current configuration for `asset`, if registered.
    pub fn feed_config(&self, asset: Address) -> Option<PriceFeedConfig> {
        self.read().get(&asset).cloned()
    }

    // ─────────────────────────── administration ───────────────────────────

    /// Register the upstream feed for `asset`. New feeds start active with no
    /// fallback price.
    pub fn add_feed(
        &self,
        caller: Address,
        asset: Address,
        feed: Address,
        heartbeat_secs: u64,
        decimals: u8,
    ) -> Result<(), OracleError> {
        self.require_manager(caller)?;
        if heartbeat_secs == 0 {
            return Err(OracleError::InvalidHeartbeat);
        }
        if decimals > MAX_FEED_DECIMALS {
            return Err(OracleError::InvalidDecimals {
                decimals,
                max: MAX_FEED_DECIMALS,
            });
        }

        {
            let mut feeds = self.write();
            if feeds.contains_key(&asset) {
                return Err(OracleError::DuplicateFeed(asset));
            }
            feeds.insert(
                asset,
                PriceFeedConfig {
                    feed,
                    heartbeat_secs,
                    decimals,
                    is_active: true,
                    manual_fallback: 0,
                },
            );
        }

        tracing::info!(
            asset = %asset,
            feed = %feed,
            heartbeat_secs,
            decimals,
            upstream = self.upstream.name(),
            "Price feed added"
        );
        self.audit.record(
            AuditEvent::FeedAdded {
                asset,
                feed,
                heartbeat_secs,
                decimals,
            },
            self.clock.now(),
        );
        Ok(())
    }

    /// Set (or clear, with zero) the manual fallback price for `asset`.
    pub fn set_manual_price(
        &self,
        caller: Address,
        asset: Address,
        price: u128,
    ) -> Result<(), OracleError> {
        self.require_manager(caller)?;
        self.update(asset, |config| config.manual_fallback = price)?;

        tracing::info!(asset = %asset, price, "Manual fallback price set");
        self.audit.record(
            AuditEvent::ManualPriceSet { asset, price },
            self.clock.now(),
        );
        Ok(())
    }

    pub fn update_heartbeat(
        &self,
        caller: Address,
        asset: Address,
        heartbeat_secs: u64,
    ) -> Result<(), OracleError> {
        self.require_manager(caller)?;
        if heartbeat_secs == 0 {
            return Err(OracleError::InvalidHeartbeat);
        }
        self.update(asset, |config| config.heartbeat_secs = heartbeat_secs)?;

        tracing::info!(asset = %asset, heartbeat_secs, "Heartbeat updated");
        self.audit.record(
            AuditEvent::HeartbeatUpdated {
                asset,
                heartbeat_secs,
            },
            self.clock.now(),
        );
        Ok(())
    }

    /// Activate or deactivate the feed for `asset`.
    pub fn set_feed_active(
        &self,
        caller: Address,
        asset: Address,
        active: bool,
    ) -> Result<(), OracleError> {
        self.require_manager(caller)?;
        self.update(asset, |config| config.is_active = active)?;

        tracing::info!(asset = %asset, active, "Price feed activity changed");
        self.audit.record(
            AuditEvent::FeedActivityChanged { asset, active },
            self.clock.now(),
        );
        Ok(())
    }

    // ───────────────────────────── internals ──────────────────────────────

    fn try_primary(
        &self,
        asset: Address,
        config: &PriceFeedConfig,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, PrimaryFault> {
        let reading = self
            .upstream
            .latest_reading(config.feed)
            .map_err(PrimaryFault::Upstream)?;

        if reading.value <= 0 {
            return Err(PrimaryFault::Rejected(OracleError::InvalidPrice {
                asset,
                value: reading.value,
            }));
        }

        let age_secs = now.signed_duration_since(reading.updated_at).num_seconds();
        if age_secs > 0 && age_secs.unsigned_abs() > config.heartbeat_secs {
            return Err(PrimaryFault::Rejected(OracleError::StalePrice {
                asset,
                age_secs,
                heartbeat_secs: config.heartbeat_secs,
            }));
        }

        let price = to_price_decimals(reading.value.unsigned_abs(), config.decimals)
            .ok_or(PrimaryFault::Rejected(OracleError::PriceOverflow(asset)))?;
        // Sub-unit readings from high-precision feeds truncate to zero
        if price == 0 {
            return Err(PrimaryFault::Rejected(OracleError::InvalidPrice {
                asset,
                value: reading.value,
            }));
        }

        Ok(PriceQuote {
            price,
            timestamp: reading.updated_at,
            source: QuoteSource::Primary,
        })
    }

    fn try_fallback(
        &self,
        asset: Address,
        config: &PriceFeedConfig,
        fault: FeedFault,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, OracleError> {
        if config.manual_fallback == 0 {
            tracing::warn!(asset = %asset, fault = %fault, "Primary feed failed and no fallback price is set");
            return Err(OracleError::NoFallbackPrice { asset, fault });
        }

        tracing::warn!(
            asset = %asset,
            fault = %fault,
            price = config.manual_fallback,
            "Primary feed failed, using manual fallback price"
        );
        Ok(PriceQuote {
            price: config.manual_fallback,
            timestamp: now,
            source: QuoteSource::Fallback,
        })
    }

    fn active_config(&self, asset: Address) -> Result<PriceFeedConfig, OracleError> {
        let config = self
            .feed_config(asset)
            .ok_or(OracleError::UnknownFeed(asset))?;
        if !config.is_active {
            return Err(OracleError::OracleInactive(asset));
        }
        Ok(config)
    }

    fn update(
        &self,
        asset: Address,
        apply: impl FnOnce(&mut PriceFeedConfig),
    ) -> Result<(), OracleError> {
        let mut feeds = self.write();
        let config = feeds
            .get_mut(&asset)
            .ok_or(OracleError::UnknownFeed(asset))?;
        apply(config);
        Ok(())
    }

    fn require_manager(&self, caller: Address) -> Result<(), OracleError> {
        if self.auth.has_role(caller, Role::OracleManager) {
            Ok(())
        } else {
            Err(OracleError::Unauthorized {
                caller,
                role: Role::OracleManager,
            })
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Address, PriceFeedConfig>> {
        self.feeds.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Address, PriceFeedConfig>> {
        self.feeds.write().unwrap_or_else(|e| e.into_inner())
    }
}
