//! External custody of collateral assets.
//!
//! The engine never holds tokens itself. It asks a `Custody` implementation
//! to pull collateral from users and release it to recipients, and relies on
//! each call being exact-amount and all-or-nothing.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::Address;

use stable_common::error::CustodyError;
use stable_common::types::Amount;

pub trait Custody: Send + Sync {
    /// Move `amount` of `asset` from `from` into custody.
    fn transfer_in(&self, asset: Address, from: Address, amount: Amount) -> Result<(), CustodyError>;

    /// Release `amount` of `asset` from custody to `to`.
    fn transfer_out(&self, asset: Address, to: Address, amount: Amount) -> Result<(), CustodyError>;

    /// Release several `(recipient, amount)` legs of `asset` as one unit:
    /// either every leg moves or none does.
    fn transfer_out_batch(&self, asset: Address, legs: &[(Address, Amount)]) -> Result<(), CustodyError>;
}

/// Balance-map custody. `vault` is the account that holds deposited collateral.
#[derive(Debug)]
pub struct InMemoryCustody {
    vault: Address,
    balances: Mutex<HashMap<(Address, Address), Amount>>,
}

impl InMemoryCustody {
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Credit `account` with `amount` of `asset` out of thin air.
    pub fn fund(&self, asset: Address, account: Address, amount: Amount) {
        let mut balances = self.lock();
        let balance = balances.entry((asset, account)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, asset: Address, account: Address) -> Amount {
        self.lock().get(&(asset, account)).copied().unwrap_or(0)
    }

    /// Collateral of `asset` currently held in custody.
    pub fn held(&self, asset: Address) -> Amount {
        self.balance_of(asset, self.vault)
    }

    pub fn vault(&self) -> Address {
        self.vault
    }

    /// Apply every `(to, amount)` leg out of `from`, or none of them.
    ///
    /// Legs are staged against a scratch copy of the touched balances and
    /// committed only once all of them validate. A leg with `to == from`
    /// nets to zero.
    fn move_balances(
        &self,
        asset: Address,
        from: Address,
        legs: &[(Address, Amount)],
    ) -> Result<(), CustodyError> {
        let mut balances = self.lock();
        let mut staged: HashMap<Address, Amount> = HashMap::new();

        for &(to, amount) in legs {
            let available = staged
                .get(&from)
                .copied()
                .unwrap_or_else(|| balance_in(&balances, asset, from));
            if available < amount {
                return Err(CustodyError::InsufficientBalance {
                    asset,
                    account: from,
                    available,
                    requested: amount,
                });
            }
            staged.insert(from, available - amount);

            let receiver = staged
                .get(&to)
                .copied()
                .unwrap_or_else(|| balance_in(&balances, asset, to));
            let credited = receiver
                .checked_add(amount)
                .ok_or_else(|| CustodyError::Rejected("receiver balance overflow".to_string()))?;
            staged.insert(to, credited);
        }

        for (account, balance) in staged {
            balances.insert((asset, account), balance);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Address, Address), Amount>> {
        self.balances.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn balance_in(
    balances: &HashMap<(Address, Address), Amount>,
    asset: Address,
    account: Address,
) -> Amount {
    balances.get(&(asset, account)).copied().unwrap_or(0)
}

impl Custody for InMemoryCustody {
    fn transfer_in(&self, asset: Address, from: Address, amount: Amount) -> Result<(), CustodyError> {
        self.move_balances(asset, from, &[(self.vault, amount)])?;
        tracing::debug!(asset = %asset, from = %from, amount, "Collateral pulled into custody");
        Ok(())
    }

    fn transfer_out(&self, asset: Address, to: Address, amount: Amount) -> Result<(), CustodyError> {
        self.move_balances(asset, self.vault, &[(to, amount)])?;
        tracing::debug!(asset = %asset, to = %to, amount, "Collateral released from custody");
        Ok(())
    }

    fn transfer_out_batch(&self, asset: Address, legs: &[(Address, Amount)]) -> Result<(), CustodyError> {
        self.move_balances(asset, self.vault, legs)?;
        tracing::debug!(asset = %asset, legs = legs.len(), "Collateral released from custody");
        Ok(())
    }
}
