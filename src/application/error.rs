use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{AccountId, Cents, InvalidWindow, ParseCentsError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds in account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid time range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(AccountId),

    #[error("Deposit of {amount} would overflow the balance of account {account}")]
    BalanceOverflow { account: AccountId, amount: Cents },

    #[error("Ledger consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// True for outcomes a caller is expected to handle (unknown account,
    /// not enough money, bad input); false for storage faults and broken
    /// invariants.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            AppError::ConsistencyViolation(_) | AppError::Database(_)
        )
    }
}

impl From<InvalidWindow> for AppError {
    fn from(err: InvalidWindow) -> Self {
        AppError::InvalidRange {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<ParseCentsError> for AppError {
    fn from(err: ParseCentsError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}
