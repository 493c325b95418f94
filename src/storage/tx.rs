use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use sqlx::{Row, Sqlite, Transaction};

use crate::domain::{Account, AccountId, Cents, Operation};

use super::repository::{encode_timestamp, row_to_account};

/// A single SQLite transaction over accounts and operations.
///
/// Balance changes are conditional updates, so the sufficiency check and the
/// write are one statement. Callers should make a write their first
/// statement: SQLite then queues concurrent writers on the busy timeout
/// instead of failing a read transaction that tries to upgrade.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    pub(super) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Subtract `amount` if the account exists and can cover it.
    /// Returns the new balance, or `None` when nothing was changed.
    pub async fn debit(&mut self, id: AccountId, amount: Cents) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents - ?
            WHERE id = ? AND balance_cents >= ?
            RETURNING balance_cents
            "#,
        )
        .bind(amount)
        .bind(id.to_string())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to debit account")?;

        Ok(row.map(|r| r.get("balance_cents")))
    }

    /// Add `amount` if the account exists and the result fits in `Cents`.
    /// Returns the new balance, or `None` when nothing was changed.
    pub async fn credit(&mut self, id: AccountId, amount: Cents) -> Result<Option<Cents>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + ?
            WHERE id = ? AND balance_cents <= ?
            RETURNING balance_cents
            "#,
        )
        .bind(amount)
        .bind(id.to_string())
        .bind(Cents::MAX - amount)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to credit account")?;

        Ok(row.map(|r| r.get("balance_cents")))
    }

    /// Read an account as seen by this transaction.
    pub async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, balance_cents, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn upsert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance_cents, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET balance_cents = excluded.balance_cents
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.balance)
        .bind(encode_timestamp(account.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Append one operation, assigning its sequence number and creation time.
    pub async fn append_operation(&mut self, operation: &mut Operation) -> Result<()> {
        self.append_operations(std::slice::from_mut(operation)).await
    }

    /// Append operations that happen at the same logical instant.
    ///
    /// The stamp is taken only once this transaction holds the write lock,
    /// so `created_at` never decreases along `sequence`.
    pub async fn append_operations(&mut self, operations: &mut [Operation]) -> Result<()> {
        let Some(first) = operations.first() else {
            return Ok(());
        };
        self.acquire_write_lock(first.account_id).await?;
        let now = Utc::now().trunc_subsecs(6);

        for operation in operations.iter_mut() {
            operation.created_at = now;

            let row = sqlx::query(
                r#"
                INSERT INTO operations (id, account_id, operation_type, amount_cents, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING sequence
                "#,
            )
            .bind(operation.id.to_string())
            .bind(operation.account_id.to_string())
            .bind(operation.operation_type.as_str())
            .bind(operation.amount)
            .bind(encode_timestamp(operation.created_at))
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to save operation")?;

            operation.sequence = row.get("sequence");
        }

        Ok(())
    }

    /// A write statement that changes nothing. Once it has run, other
    /// writers wait for this transaction to finish.
    async fn acquire_write_lock(&mut self, id: AccountId) -> Result<()> {
        sqlx::query("UPDATE accounts SET balance_cents = balance_cents WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to take the write lock")?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }
}
