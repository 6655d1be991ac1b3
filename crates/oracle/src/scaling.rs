//! Fixed-point conversions between feed precision and the adapter's 8 decimals.

use std::cmp::Ordering;

use alloy::primitives::U256;

use stable_common::types::{Amount, PRICE_DECIMALS};

/// Rescale a positive raw feed answer to `PRICE_DECIMALS`.
///
/// Multiplies when the feed is less precise, integer-divides when it is more
/// precise. Returns `None` on overflow.
pub fn to_price_decimals(raw: u128, decimals: u8) -> Option<u128> {
    match decimals.cmp(&PRICE_DECIMALS) {
        Ordering::Equal => Some(raw),
        Ordering::Less => {
            let factor = 10u128.checked_pow(u32::from(PRICE_DECIMALS - decimals))?;
            raw.checked_mul(factor)
        }
        Ordering::Greater => {
            let factor = 10u128.checked_pow(u32::from(decimals - PRICE_DECIMALS))?;
            Some(raw / factor)
        }
    }
}

/// USD value (8 decimals) of `amount` units priced at `price` per unit.
pub fn value_of(amount: Amount, price: u128) -> Option<u128> {
    let value = U256::from(amount) * U256::from(price);
    u128::try_from(value).ok()
}
