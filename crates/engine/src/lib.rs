pub mod custody;
pub mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod liquidation;
pub mod reentrancy;
pub mod registry;

pub use custody::{Custody, InMemoryCustody};
pub use engine::CollateralEngine;
