use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    build_integrity_report, replay_all_balances, Account, AccountId, Cents, HistoryWindow,
    IntegrityReport, Operation, OperationType,
};
use crate::storage::{LedgerTx, Repository};

use super::{AccountLocks, AppError};

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, seeder, tests).
pub struct LedgerService {
    repo: Repository,
    locks: AccountLocks,
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    pub operation: Operation,
    /// Balance right after the operation committed
    pub balance: Cents,
}

/// Result of a transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub withdrawal: Operation,
    pub deposit: Operation,
    pub sender_balance: Cents,
    pub recipient_balance: Cents,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            locks: AccountLocks::new(),
        }
    }

    /// Initialize a database (creating it if needed) and connect to it.
    pub async fn init(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::init(config).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(config, false).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account. A positive initial deposit is recorded as a regular
    /// deposit in the same transaction, so history always explains the balance.
    pub async fn open_account(&self, initial_deposit: Cents) -> Result<Account, AppError> {
        ensure_non_negative(initial_deposit)?;

        let mut account = Account::new();
        let mut tx = self.repo.begin().await?;
        tx.upsert_account(&account).await?;

        if initial_deposit > 0 {
            account.balance = credit_or_reject(&mut tx, account.id, initial_deposit).await?;
            record_operation(&mut tx, account.id, OperationType::Deposit, initial_deposit)
                .await?;
        }

        tx.commit().await?;
        info!(account = %account.id, balance = account.balance, "account opened");
        Ok(account)
    }

    /// Open several empty accounts at once.
    pub async fn open_accounts(&self, count: usize) -> Result<Vec<Account>, AppError> {
        let accounts: Vec<Account> = (0..count).map(|_| Account::new()).collect();
        self.repo.save_accounts(&accounts).await?;
        info!(count, "accounts opened");
        Ok(accounts)
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, AppError> {
        Ok(self.repo.get_account(account_id).await?)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts().await?)
    }

    pub async fn count_accounts(&self) -> Result<i64, AppError> {
        Ok(self.repo.count_accounts().await?)
    }

    /// Current balance, or `None` if the account does not exist.
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Option<Cents>, AppError> {
        Ok(self
            .repo
            .get_account(account_id)
            .await?
            .map(|account| account.balance))
    }

    // ========================
    // Balance mutations
    // ========================

    /// Add money to an account.
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<OperationReceipt, AppError> {
        ensure_non_negative(amount)?;

        let _guard = self.locks.lock(account_id).await;
        let mut tx = self.repo.begin().await?;

        let balance = credit_or_reject(&mut tx, account_id, amount)
            .await
            .inspect_err(|e| debug!(account = %account_id, amount, error = %e, "deposit rejected"))?;
        let operation =
            record_operation(&mut tx, account_id, OperationType::Deposit, amount).await?;

        tx.commit().await?;
        info!(account = %account_id, amount, balance, "deposit committed");
        Ok(OperationReceipt { operation, balance })
    }

    /// Take money out of an account. Fails without side effects when the
    /// account is unknown or cannot cover the amount.
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: Cents,
    ) -> Result<OperationReceipt, AppError> {
        ensure_non_negative(amount)?;

        let _guard = self.locks.lock(account_id).await;
        let mut tx = self.repo.begin().await?;

        let balance = debit_or_reject(&mut tx, account_id, amount)
            .await
            .inspect_err(|e| debug!(account = %account_id, amount, error = %e, "withdrawal rejected"))?;
        let operation =
            record_operation(&mut tx, account_id, OperationType::Withdrawal, amount).await?;

        tx.commit().await?;
        info!(account = %account_id, amount, balance, "withdrawal committed");
        Ok(OperationReceipt { operation, balance })
    }

    /// Move money between two accounts.
    ///
    /// Both balances and both operation rows commit together or not at all,
    /// while holding both account locks.
    pub async fn transfer(
        &self,
        sender_id: AccountId,
        recipient_id: AccountId,
        amount: Cents,
    ) -> Result<TransferReceipt, AppError> {
        ensure_non_negative(amount)?;
        if sender_id == recipient_id {
            return Err(AppError::SelfTransfer(sender_id));
        }

        let _guard = self.locks.lock_all(&[sender_id, recipient_id]).await;
        let mut tx = self.repo.begin().await?;

        let (sender_balance, recipient_balance) =
            move_balances(&mut tx, sender_id, recipient_id, amount)
                .await
                .inspect_err(|e| {
                    debug!(
                        sender = %sender_id,
                        recipient = %recipient_id,
                        amount,
                        error = %e,
                        "transfer rejected"
                    )
                })?;

        let mut operations = [
            Operation::withdrawal(sender_id, amount),
            Operation::deposit(recipient_id, amount),
        ];
        record_operations(&mut tx, &mut operations).await?;

        tx.commit().await?;
        info!(
            sender = %sender_id,
            recipient = %recipient_id,
            amount,
            "transfer committed"
        );

        let [withdrawal, deposit] = operations;
        Ok(TransferReceipt {
            withdrawal,
            deposit,
            sender_balance,
            recipient_balance,
        })
    }

    // ========================
    // History operations
    // ========================

    /// Operations of an account, in creation order.
    ///
    /// Without bounds the whole history is returned. With either bound the
    /// result is limited to `from <= created_at <= to`; a missing bound is
    /// open-ended. An unknown account simply has no history.
    pub async fn operation_history(
        &self,
        account_id: AccountId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Operation>, AppError> {
        let operations = match HistoryWindow::resolve(from, to)? {
            HistoryWindow::All => self.repo.list_operations_for_account(account_id).await?,
            HistoryWindow::Range { from, to } => {
                self.repo
                    .list_operations_in_range(account_id, from, to)
                    .await?
            }
        };
        Ok(operations)
    }

    pub async fn count_operations(&self) -> Result<i64, AppError> {
        Ok(self.repo.count_operations().await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check that every balance is explained by its operation history.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.repo.list_accounts().await?;
        let operations = self.repo.list_operations().await?;
        let stats = self.repo.get_integrity_stats().await?;

        let report = build_integrity_report(
            &accounts,
            &replay_all_balances(&operations),
            stats.operation_count,
            stats.invalid_amounts,
            stats.orphaned_operations,
        );

        for mismatch in &report.mismatches {
            warn!(
                account = %mismatch.account_id,
                stored = mismatch.stored,
                replayed = mismatch.replayed,
                "balance not explained by history"
            );
        }

        Ok(report)
    }
}

fn ensure_non_negative(amount: Cents) -> Result<(), AppError> {
    if amount < 0 {
        return Err(AppError::InvalidAmount(format!(
            "amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

async fn credit_or_reject(
    tx: &mut LedgerTx,
    account_id: AccountId,
    amount: Cents,
) -> Result<Cents, AppError> {
    if let Some(balance) = tx.credit(account_id, amount).await? {
        return Ok(balance);
    }

    match tx.get_account(account_id).await? {
        None => Err(AppError::AccountNotFound(account_id)),
        Some(_) => Err(AppError::BalanceOverflow {
            account: account_id,
            amount,
        }),
    }
}

async fn debit_or_reject(
    tx: &mut LedgerTx,
    account_id: AccountId,
    amount: Cents,
) -> Result<Cents, AppError> {
    if let Some(balance) = tx.debit(account_id, amount).await? {
        return Ok(balance);
    }

    match tx.get_account(account_id).await? {
        None => Err(AppError::AccountNotFound(account_id)),
        Some(account) => Err(insufficient_funds(&account, amount)),
    }
}

/// The rejection for a debit that did not apply to an existing account.
fn insufficient_funds(account: &Account, amount: Cents) -> AppError {
    if account.can_cover(amount) {
        // The guarded UPDATE refused a debit the balance allows.
        return AppError::ConsistencyViolation(format!(
            "debit of {} from account {} was refused with balance {}",
            amount, account.id, account.balance
        ));
    }
    AppError::InsufficientFunds {
        account: account.id,
        balance: account.balance,
        required: amount,
    }
}

/// Debit the sender and credit the recipient. When the debit does not apply,
/// a missing account takes precedence over insufficient funds.
async fn move_balances(
    tx: &mut LedgerTx,
    sender_id: AccountId,
    recipient_id: AccountId,
    amount: Cents,
) -> Result<(Cents, Cents), AppError> {
    let sender_balance = match tx.debit(sender_id, amount).await? {
        Some(balance) => balance,
        None => {
            let sender = tx
                .get_account(sender_id)
                .await?
                .ok_or(AppError::AccountNotFound(sender_id))?;
            if tx.get_account(recipient_id).await?.is_none() {
                return Err(AppError::AccountNotFound(recipient_id));
            }
            return Err(insufficient_funds(&sender, amount));
        }
    };

    let recipient_balance = credit_or_reject(tx, recipient_id, amount).await?;
    Ok((sender_balance, recipient_balance))
}

/// Append one operation for an account inside the caller's transaction.
pub(crate) async fn record_operation(
    tx: &mut LedgerTx,
    account_id: AccountId,
    operation_type: OperationType,
    amount: Cents,
) -> Result<Operation, AppError> {
    let mut operations = [Operation::new(account_id, operation_type, amount)];
    record_operations(tx, &mut operations).await?;
    let [operation] = operations;
    Ok(operation)
}

/// Append operations sharing one instant. Every referenced account is read
/// again first; a missing one means the enclosing mutation must roll back.
async fn record_operations(tx: &mut LedgerTx, operations: &mut [Operation]) -> Result<(), AppError> {
    for operation in operations.iter() {
        if tx.get_account(operation.account_id).await?.is_none() {
            warn!(
                account = %operation.account_id,
                operation_type = %operation.operation_type,
                "account vanished before its operation was recorded"
            );
            return Err(AppError::ConsistencyViolation(format!(
                "account {} disappeared before its {} of {} could be recorded",
                operation.account_id, operation.operation_type, operation.amount
            )));
        }
    }

    tx.append_operations(operations).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;

    async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(temp_dir.path().join("unit.db"));
        let repo = Repository::init(&config).await.unwrap();
        (repo, temp_dir)
    }

    #[tokio::test]
    async fn test_record_operation_for_missing_account_is_a_violation() {
        let (repo, _temp) = test_repo().await;

        let mut tx = repo.begin().await.unwrap();
        let err = record_operation(&mut tx, Uuid::new_v4(), OperationType::Deposit, 100)
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(err, AppError::ConsistencyViolation(_)));
        assert!(!err.is_rejection());
        assert_eq!(repo.count_operations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_violation_rolls_back_balance_change() {
        let (repo, _temp) = test_repo().await;
        let account = Account::new().with_balance(1000);
        repo.save_account(&account).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        tx.credit(account.id, 500).await.unwrap();
        let err = record_operations(
            &mut tx,
            &mut [
                Operation::deposit(account.id, 500),
                Operation::deposit(Uuid::new_v4(), 500),
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ConsistencyViolation(_)));
        drop(tx);

        let stored = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, 1000);
        assert_eq!(repo.count_operations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_operations_leave_no_lock_slots() {
        let (repo, _temp) = test_repo().await;
        let service = LedgerService::new(repo);
        let known = service.open_account(100).await.unwrap();

        for _ in 0..200 {
            let ghost = Uuid::new_v4();
            assert!(service.deposit(ghost, 1).await.is_err());
            assert!(service.withdraw(ghost, 1).await.is_err());
            assert!(service.transfer(known.id, ghost, 1).await.is_err());
        }
        assert!(service.withdraw(known.id, 1000).await.is_err());
        service.deposit(known.id, 1).await.unwrap();

        assert_eq!(service.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_debit_rejection_reports_current_balance() {
        let (repo, _temp) = test_repo().await;
        let account = Account::new().with_balance(300);
        repo.save_account(&account).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let err = debit_or_reject(&mut tx, account.id, 301).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientFunds { balance: 300, required: 301, .. }
        ));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(ensure_non_negative(0).is_ok());
        assert!(matches!(
            ensure_non_negative(-1),
            Err(AppError::InvalidAmount(_))
        ));
    }
}
