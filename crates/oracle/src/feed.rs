use std::collections::HashMap;
use std::sync::RwLock;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stable_common::error::FeedFault;

/// Raw answer published by an upstream feed, in the feed's native precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub value: i128,
    pub updated_at: DateTime<Utc>,
}

/// Trait that every upstream price source must implement.
///
/// `Err` means the call itself failed (network, revert, missing round). A
/// successful call that returns a nonsensical or old value is still `Ok`;
/// judging the reading is the adapter's job.
pub trait PriceFeed: Send + Sync {
    fn latest_reading(&self, feed: Address) -> Result<Reading, FeedFault>;

    /// Human-readable name for logs (e.g., "in-memory").
    fn name(&self) -> &'static str;
}

/// Settable feed backed by a map. Used by tests and the scenario runner.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    answers: RwLock<HashMap<Address, Result<Reading, FeedFault>>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reading(&self, feed: Address, value: i128, updated_at: DateTime<Utc>) {
        self.write()
            .insert(feed, Ok(Reading { value, updated_at }));
    }

    /// Make every subsequent call for `feed` fail with `fault`.
    pub fn set_fault(&self, feed: Address, fault: FeedFault) {
        self.write().insert(feed, Err(fault));
    }

    pub fn clear(&self, feed: Address) {
        self.write().remove(&feed);
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Address, Result<Reading, FeedFault>>> {
        self.answers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PriceFeed for InMemoryFeed {
    fn latest_reading(&self, feed: Address) -> Result<Reading, FeedFault> {
        self.answers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&feed)
            .cloned()
            .unwrap_or(Err(FeedFault::NoReading(feed)))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: Address = Address::repeat_byte(0xFE);

    #[test]
    fn test_missing_reading_is_a_fault() {
        let feed = InMemoryFeed::new();
        assert_eq!(
            feed.latest_reading(FEED),
            Err(FeedFault::NoReading(FEED))
        );
    }

    #[test]
    fn test_set_reading_then_fault() {
        let feed = InMemoryFeed::new();
        let at = Utc::now();
        feed.set_reading(FEED, 2_000_00000000, at);
        assert_eq!(feed.latest_reading(FEED).unwrap().value, 2_000_00000000);

        feed.set_fault(FEED, FeedFault::Unavailable("rpc timeout".to_string()));
        assert!(matches!(
            feed.latest_reading(FEED),
            Err(FeedFault::Unavailable(_))
        ));

        feed.clear(FEED);
        assert!(matches!(
            feed.latest_reading(FEED),
            Err(FeedFault::NoReading(_))
        ));
    }

    #[test]
    fn test_name() {
        assert_eq!(InMemoryFeed::new().name(), "in-memory");
    }
}
