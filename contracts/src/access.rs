//! # Access Control
//!
//! Administrative operations (asset registration, feed replacement,
//! precision overrides) are gated behind an opaque capability check. The
//! bank only asks "is this caller an admin?"; who decides, and how, is the
//! collaborator's business.

use std::collections::HashSet;

use parking_lot::RwLock;

use vaultline_protocol::AccountId;

use crate::error::{BankError, BankResult};

/// Answers whether an account holds the admin role.
pub trait AccessControl: Send + Sync {
    /// `true` if `caller` may run administrative operations.
    fn is_admin(&self, caller: &AccountId) -> bool;
}

/// A plain set of admin accounts.
#[derive(Debug, Default)]
pub struct AdminSet {
    admins: RwLock<HashSet<AccountId>>,
}

impl AdminSet {
    /// Creates a set containing the given admins.
    pub fn new(admins: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            admins: RwLock::new(admins.into_iter().collect()),
        }
    }

    /// Grants the admin role. Returns `false` if it was already held.
    pub fn grant(&self, account: AccountId) -> bool {
        self.admins.write().insert(account)
    }

    /// Revokes the admin role. Returns `false` if it was not held.
    pub fn revoke(&self, account: &AccountId) -> bool {
        self.admins.write().remove(account)
    }
}

impl AccessControl for AdminSet {
    fn is_admin(&self, caller: &AccountId) -> bool {
        self.admins.read().contains(caller)
    }
}

/// Fails with [`BankError::Unauthorized`] unless `caller` is an admin.
pub(crate) fn require_admin(access: &dyn AccessControl, caller: &AccountId) -> BankResult<()> {
    if access.is_admin(caller) {
        Ok(())
    } else {
        tracing::warn!(caller = %caller, "unauthorized admin call");
        Err(BankError::Unauthorized(*caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let admin = AccountId::from_low_u8(1);
        let set = AdminSet::default();
        assert!(!set.is_admin(&admin));

        assert!(set.grant(admin));
        assert!(!set.grant(admin));
        assert!(set.is_admin(&admin));

        assert!(set.revoke(&admin));
        assert!(!set.revoke(&admin));
        assert!(!set.is_admin(&admin));
    }

    #[test]
    fn require_admin_rejects_strangers() {
        let set = AdminSet::new([AccountId::from_low_u8(1)]);
        assert!(require_admin(&set, &AccountId::from_low_u8(1)).is_ok());
        assert_eq!(
            require_admin(&set, &AccountId::from_low_u8(2)).unwrap_err(),
            BankError::Unauthorized(AccountId::from_low_u8(2))
        );
    }
}
