use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type OperationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Money added to the account
    Deposit,
    /// Money taken out of the account
    Withdrawal,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(OperationType::Deposit),
            "withdrawal" => Some(OperationType::Withdrawal),
            _ => None,
        }
    }

    /// Effect of an operation of this type on the balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            OperationType::Deposit => amount,
            OperationType::Withdrawal => -amount,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single balance-affecting event on one account.
/// Operations are append-only: once stored they are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    /// Insertion order, assigned by the repository
    pub sequence: i64,
    pub account_id: AccountId,
    pub operation_type: OperationType,
    /// Magnitude moved, never negative
    pub amount: Cents,
    /// Stamped by the repository when the row is written
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Create a new operation. Sequence and creation time are assigned by the repository.
    pub fn new(account_id: AccountId, operation_type: OperationType, amount: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            operation_type,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn deposit(account_id: AccountId, amount: Cents) -> Self {
        Self::new(account_id, OperationType::Deposit, amount)
    }

    pub fn withdrawal(account_id: AccountId, amount: Cents) -> Self {
        Self::new(account_id, OperationType::Withdrawal, amount)
    }

    pub fn signed_amount(&self) -> Cents {
        self.operation_type.signed(self.amount)
    }
}
