use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{Account, AccountId, Operation, OperationType};

use super::{LedgerTx, MIGRATION_001_INITIAL};

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub operation_count: i64,
    pub invalid_amounts: i64,
    pub orphaned_operations: i64,
}

/// Repository for persisting and querying accounts and their operations.
///
/// Plain reads and writes go straight to the pool. Balance mutations must go
/// through [`Repository::begin`] so the account row and its operation rows
/// commit together.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for the configured database file.
    pub async fn connect(config: &LedgerConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;

        debug!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "database pool ready"
        );
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect, creating the file, then migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let repo = Self::connect(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a unit of work. Dropping it without committing rolls back.
    pub async fn begin(&self) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(LedgerTx::new(tx))
    }

    // ========================
    // Account operations
    // ========================

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, balance_cents, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Insert an account, or overwrite the balance of an existing one.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.upsert_account(account).await?;
        tx.commit().await
    }

    /// Save several accounts in one transaction.
    pub async fn save_accounts(&self, accounts: &[Account]) -> Result<()> {
        let mut tx = self.begin().await?;
        for account in accounts {
            tx.upsert_account(account).await?;
        }
        tx.commit().await
    }

    pub async fn count_accounts(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM accounts")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count accounts")?
            .get("count");
        Ok(count)
    }

    /// List all accounts, oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, balance_cents, created_at
            FROM accounts
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    // ========================
    // Operation operations
    // ========================

    /// Append one operation. Sequence and creation time are assigned here.
    pub async fn save_operation(&self, operation: &mut Operation) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.append_operation(operation).await?;
        tx.commit().await
    }

    /// Append several operations in one transaction, stamped with one instant.
    pub async fn save_operations(&self, operations: &mut [Operation]) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.append_operations(operations).await?;
        tx.commit().await
    }

    pub async fn count_operations(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM operations")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count operations")?
            .get("count");
        Ok(count)
    }

    /// List every operation in insertion order.
    pub async fn list_operations(&self) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, account_id, operation_type, amount_cents, created_at
            FROM operations
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operations")?;

        rows.iter().map(row_to_operation).collect()
    }

    /// List the operations of one account in insertion order.
    pub async fn list_operations_for_account(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, account_id, operation_type, amount_cents, created_at
            FROM operations
            WHERE account_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operations for account")?;

        rows.iter().map(row_to_operation).collect()
    }

    /// List the operations of one account created within `[from, to]`, inclusive.
    pub async fn list_operations_in_range(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, account_id, operation_type, amount_cents, created_at
            FROM operations
            WHERE account_id = ? AND created_at >= ? AND created_at <= ?
            ORDER BY sequence
            "#,
        )
        .bind(account_id.to_string())
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operations in range")?;

        rows.iter().map(row_to_operation).collect()
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let operation_count = self.count_operations().await?;

        let invalid_amounts: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM operations
            WHERE amount_cents < 0
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count invalid amounts")?
        .get("count");

        let orphaned_operations: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM operations o
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = o.account_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphaned operations")?
        .get("count");

        Ok(IntegrityStats {
            operation_count,
            invalid_amounts,
            orphaned_operations,
        })
    }
}

/// Fixed-width UTC form, so that text order matches time order.
pub(crate) fn encode_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

pub(crate) fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");

    Ok(Account {
        id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
        balance: row.get("balance_cents"),
        created_at: decode_timestamp(&created_at_str)?,
    })
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation> {
    let id_str: String = row.get("id");
    let account_id_str: String = row.get("account_id");
    let type_str: String = row.get("operation_type");
    let created_at_str: String = row.get("created_at");

    Ok(Operation {
        id: Uuid::parse_str(&id_str).context("Invalid operation ID")?,
        sequence: row.get("sequence"),
        account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
        operation_type: OperationType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid operation type: {}", type_str))?,
        amount: row.get("amount_cents"),
        created_at: decode_timestamp(&created_at_str)?,
    })
}
