//! USD price resolution for collateral assets.
//!
//! `PriceOracle` resolves a price in two named steps: the upstream feed
//! (`PriceFeed`) is tried first, and the administrator-set manual price is
//! consulted only when the feed call itself fails. Bad or stale readings are
//! never papered over by the fallback.

pub mod adapter;
pub mod feed;
pub mod scaling;

pub use adapter::PriceOracle;
pub use feed::{InMemoryFeed, PriceFeed, Reading};
