use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::LedgerService;
use crate::domain::{format_cents, AccountId, Cents, Operation};

/// An account's history as written by [`Exporter::export_history_json`]
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account_id: AccountId,
    pub balance: Option<Cents>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub operations: Vec<Operation>,
}

/// Exporter for writing operation history in machine-readable formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account's operations to CSV. Returns the number of rows.
    pub async fn export_history_csv<W: Write>(
        &self,
        writer: W,
        account_id: AccountId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let operations = self.service.operation_history(account_id, from, to).await?;
        write_operations_csv(writer, &operations)
    }

    /// Export an account's operations as a JSON snapshot.
    pub async fn export_history_json<W: Write>(
        &self,
        mut writer: W,
        account_id: AccountId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<HistorySnapshot> {
        let operations = self.service.operation_history(account_id, from, to).await?;
        let balance = self.service.get_balance(account_id).await?;

        let snapshot = HistorySnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account_id,
            balance,
            from,
            to,
            operations,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

/// Write operations as CSV rows, amounts in both cents and display form.
pub fn write_operations_csv<W: Write>(writer: W, operations: &[Operation]) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "sequence",
        "created_at",
        "account_id",
        "type",
        "amount_cents",
        "amount",
    ])?;

    for operation in operations {
        csv_writer.write_record([
            operation.id.to_string(),
            operation.sequence.to_string(),
            operation.created_at.to_rfc3339(),
            operation.account_id.to_string(),
            operation.operation_type.as_str().to_string(),
            operation.amount.to_string(),
            format_cents(operation.amount),
        ])?;
    }

    csv_writer.flush()?;
    Ok(operations.len())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_csv_layout() {
        let account = Uuid::new_v4();
        let operations = vec![
            Operation::deposit(account, 10000),
            Operation::withdrawal(account, 2550),
        ];

        let mut buffer = Vec::new();
        let count = write_operations_csv(&mut buffer, &operations).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "id,sequence,created_at,account_id,type,amount_cents,amount"
        );
        assert!(lines[1].ends_with(",deposit,10000,100.00"));
        assert!(lines[2].ends_with(",withdrawal,2550,25.50"));
    }

    #[test]
    fn test_csv_empty_history_has_header_only() {
        let mut buffer = Vec::new();
        assert_eq!(write_operations_csv(&mut buffer, &[]).unwrap(), 0);
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 1);
    }
}
