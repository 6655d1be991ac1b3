//! Role-based authorization.
//!
//! Components never decide "who may call" themselves; they ask an injected
//! `AuthorizationProvider` before touching any state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use alloy::primitives::Address;

use crate::audit::{AuditEvent, AuditLog};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::types::Role;

/// Capability check against a caller identity.
pub trait AuthorizationProvider: Send + Sync {
    fn has_role(&self, identity: Address, role: Role) -> bool;
}

/// Fail with `EngineError::Unauthorized` unless `caller` holds `role`.
pub fn require_role(
    auth: &dyn AuthorizationProvider,
    caller: Address,
    role: Role,
) -> Result<(), EngineError> {
    if auth.has_role(caller, role) {
        Ok(())
    } else {
        tracing::debug!(caller = %caller, role = %role, "Authorization denied");
        Err(EngineError::Unauthorized { caller, role })
    }
}

/// In-memory role table administered by holders of `Role::Admin`.
pub struct AccessControl {
    roles: RwLock<HashMap<Role, HashSet<Address>>>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl AccessControl {
    /// Create a role table with `admin` as the sole initial admin.
    pub fn new(admin: Address, audit: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        let mut roles = HashMap::new();
        roles.insert(Role::Admin, HashSet::from([admin]));
        Self {
            roles: RwLock::new(roles),
            audit,
            clock,
        }
    }

    pub fn grant_role(
        &self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), EngineError> {
        require_role(self, caller, Role::Admin)?;

        let inserted = self
            .roles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role)
            .or_default()
            .insert(account);

        if inserted {
            tracing::info!(role = %role, account = %account, by = %caller, "Role granted");
            self.audit.record(
                AuditEvent::RoleGranted {
                    role,
                    account,
                    by: caller,
                },
                self.clock.now(),
            );
        }
        Ok(())
    }

    /// Revoke a role. Admins cannot revoke their own admin role.
    pub fn revoke_role(
        &self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), EngineError> {
        require_role(self, caller, Role::Admin)?;
        if role == Role::Admin && account == caller {
            return Err(EngineError::SelfRevocation(caller));
        }

        let removed = self
            .roles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&role)
            .is_some_and(|members| members.remove(&account));

        if removed {
            tracing::info!(role = %role, account = %account, by = %caller, "Role revoked");
            self.audit.record(
                AuditEvent::RoleRevoked {
                    role,
                    account,
                    by: caller,
                },
                self.clock.now(),
            );
        }
        Ok(())
    }

    /// Number of identities holding `role`.
    pub fn member_count(&self, role: Role) -> usize {
        self.roles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&role)
            .map_or(0, HashSet::len)
    }
}

impl AuthorizationProvider for AccessControl {
    fn has_role(&self, identity: Address, role: Role) -> bool {
        self.roles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&role)
            .is_some_and(|members| members.contains(&identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const ADMIN: Address = Address::repeat_byte(0xAD);
    const ALICE: Address = Address::repeat_byte(0xA1);

    fn make_access() -> (AccessControl, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        (AccessControl::new(ADMIN, audit.clone(), clock), audit)
    }

    #[test]
    fn test_initial_admin() {
        let (access, _) = make_access();
        assert!(access.has_role(ADMIN, Role::Admin));
        assert!(!access.has_role(ALICE, Role::Admin));
        assert_eq!(access.member_count(Role::Admin), 1);
    }

    #[test]
    fn test_grant_and_revoke() {
        let (access, audit) = make_access();
        access.grant_role(ADMIN, Role::Liquidator, ALICE).unwrap();
        assert!(access.has_role(ALICE, Role::Liquidator));
        assert!(!access.has_role(ALICE, Role::Manager));

        access.revoke_role(ADMIN, Role::Liquidator, ALICE).unwrap();
        assert!(!access.has_role(ALICE, Role::Liquidator));
        assert_eq!(audit.len(), 2);
    }

    #[test]
    fn test_duplicate_grant_not_audited_twice() {
        let (access, audit) = make_access();
        access.grant_role(ADMIN, Role::Minter, ALICE).unwrap();
        access.grant_role(ADMIN, Role::Minter, ALICE).unwrap();
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let (access, _) = make_access();
        let err = access.grant_role(ALICE, Role::Manager, ALICE).unwrap_err();
        assert_eq!(
            err,
            EngineError::Unauthorized {
                caller: ALICE,
                role: Role::Admin
            }
        );
        assert!(!access.has_role(ALICE, Role::Manager));
    }

    #[test]
    fn test_admin_cannot_revoke_self() {
        let (access, _) = make_access();
        let err = access.revoke_role(ADMIN, Role::Admin, ADMIN).unwrap_err();
        assert_eq!(err, EngineError::SelfRevocation(ADMIN));
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(access.has_role(ADMIN, Role::Admin));
    }
}
