use std::collections::HashMap;

use serde::Serialize;

use super::{Account, AccountId, Cents, Operation};

/// Replay all operations, grouped by account. Deposits add, withdrawals
/// subtract.
pub fn replay_all_balances(operations: &[Operation]) -> HashMap<AccountId, Cents> {
    let mut balances: HashMap<AccountId, Cents> = HashMap::new();

    for op in operations {
        *balances.entry(op.account_id).or_insert(0) += op.signed_amount();
    }

    balances
}

/// An account whose stored balance is not explained by its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored: Cents,
    pub replayed: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub operation_count: i64,
    pub negative_balances: Vec<AccountId>,
    pub mismatches: Vec<BalanceMismatch>,
    pub invalid_amounts: i64,
    pub orphaned_operations: i64,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.negative_balances.is_empty()
            && self.mismatches.is_empty()
            && self.invalid_amounts == 0
            && self.orphaned_operations == 0
    }
}

/// Compare every account's stored balance against the replay of its operations.
pub fn build_integrity_report(
    accounts: &[Account],
    replayed: &HashMap<AccountId, Cents>,
    operation_count: i64,
    invalid_amounts: i64,
    orphaned_operations: i64,
) -> IntegrityReport {
    let negative_balances = accounts
        .iter()
        .filter(|a| a.balance < 0)
        .map(|a| a.id)
        .collect();

    let mismatches = accounts
        .iter()
        .filter_map(|a| {
            let replayed = replayed.get(&a.id).copied().unwrap_or(0);
            (replayed != a.balance).then_some(BalanceMismatch {
                account_id: a.id,
                stored: a.balance,
                replayed,
            })
        })
        .collect();

    IntegrityReport {
        account_count: accounts.len() as i64,
        operation_count,
        negative_balances,
        mismatches,
        invalid_amounts,
        orphaned_operations,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_replay_empty() {
        assert!(replay_all_balances(&[]).is_empty());
    }

    #[test]
    fn test_replay_mixed() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ops = vec![
            Operation::deposit(a, 10000),
            Operation::withdrawal(a, 2500),
            Operation::deposit(b, 700),
            Operation::withdrawal(a, 500),
        ];

        let all = replay_all_balances(&ops);
        assert_eq!(all.get(&a), Some(&7000));
        assert_eq!(all.get(&b), Some(&700));
    }

    #[test]
    fn test_transfer_pair_conserves_total() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let ops = vec![
            Operation::withdrawal(sender, 5000),
            Operation::deposit(recipient, 5000),
        ];

        let total: Cents = replay_all_balances(&ops).values().sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_report_flags_unexplained_balance() {
        let explained = Account::new().with_balance(300);
        let unexplained = Account::new().with_balance(900);
        let ops = vec![
            Operation::deposit(explained.id, 300),
            Operation::deposit(unexplained.id, 100),
        ];

        let report = build_integrity_report(
            &[explained.clone(), unexplained.clone()],
            &replay_all_balances(&ops),
            ops.len() as i64,
            0,
            0,
        );

        assert!(!report.is_healthy());
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                account_id: unexplained.id,
                stored: 900,
                replayed: 100,
            }]
        );
    }

    #[test]
    fn test_report_healthy_for_empty_accounts() {
        let account = Account::new();
        let report = build_integrity_report(&[account], &HashMap::new(), 0, 0, 0);
        assert!(report.is_healthy());
    }
}
