use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;

/// An account holding a non-negative balance.
/// Balances only change through deposits, withdrawals and transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, empty account.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            balance: 0,
            created_at: Utc::now(),
        }
    }

    /// Start from a given balance. Used for provisioning outside the
    /// service, e.g. by store-level tests.
    pub fn with_balance(mut self, balance: Cents) -> Self {
        self.balance = balance;
        self
    }

    pub fn can_cover(&self, amount: Cents) -> bool {
        self.balance >= amount
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_empty() {
        let account = Account::new();
        assert_eq!(account.balance, 0);
        assert!(account.can_cover(0));
        assert!(!account.can_cover(1));
    }

    #[test]
    fn test_accounts_get_distinct_ids() {
        assert_ne!(Account::new().id, Account::new().id);
    }

    #[test]
    fn test_can_cover_exact_balance() {
        let account = Account::new().with_balance(10000);
        assert!(account.can_cover(10000));
        assert!(!account.can_cover(10001));
    }
}
