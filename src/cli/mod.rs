use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::{LedgerConfig, SeedConfig};
use crate::domain::{format_cents, parse_cents, AccountId, Operation};
use crate::io::{write_operations_csv, Exporter};
use crate::seed::Seeder;

/// Tally - account ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Account balances with deposits, withdrawals, transfers and operation history")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "TALLY_DATABASE", default_value = "tally.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "TALLY_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open a new account
    Open {
        /// Initial deposit (e.g., "50.00" or "50")
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        initial: String,
    },

    /// List all accounts with their balances
    Accounts,

    /// Show the balance of an account
    Balance {
        /// Account ID
        account: String,
    },

    /// Deposit money into an account
    Deposit {
        /// Account ID
        account: String,

        /// Amount to deposit
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account ID
        account: String,

        /// Amount to withdraw
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },

    /// Transfer money between accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Sender account ID
        #[arg(long)]
        from: String,

        /// Recipient account ID
        #[arg(long)]
        to: String,
    },

    /// List the operations of an account
    Operations {
        /// Account ID
        account: String,

        /// Only operations at or after this time (YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD, UTC).
        /// A bare date starts at midnight.
        #[arg(long)]
        from: Option<String>,

        /// Only operations at or before this time (YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD, UTC).
        /// A bare date includes that whole day.
        #[arg(long)]
        to: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Verify that balances are explained by their history
    Check,

    /// Fill the ledger with random accounts and operations
    Seed {
        /// Create accounts until at least this many exist
        #[arg(long, default_value_t = 100)]
        accounts: usize,

        /// Number of synthetic transfers
        #[arg(long, default_value_t = 50)]
        transfers: usize,

        /// Fixed RNG seed for reproducible data
        #[arg(long)]
        rng_seed: Option<u64>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl Cli {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::new(&self.database).with_max_connections(self.max_connections)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.ledger_config();

        match self.command {
            Commands::Init => {
                LedgerService::init(&config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Open { initial } => {
                let service = connect(&config).await?;
                let amount = parse_amount(&initial)?;
                let account = service.open_account(amount).await?;
                println!(
                    "Opened account {} with balance {}",
                    account.id,
                    format_cents(account.balance)
                );
            }

            Commands::Accounts => {
                let service = connect(&config).await?;
                run_accounts_command(&service).await?;
            }

            Commands::Balance { account } => {
                let service = connect(&config).await?;
                let id = parse_account_id(&account)?;
                match service.get_balance(id).await? {
                    Some(balance) => println!("{}: {}", id, format_cents(balance)),
                    None => anyhow::bail!("Account not found: {}", id),
                }
            }

            Commands::Deposit { account, amount } => {
                let service = connect(&config).await?;
                let id = parse_account_id(&account)?;
                let receipt = service.deposit(id, parse_amount(&amount)?).await?;
                println!(
                    "Deposited {} into {} (balance {})",
                    format_cents(receipt.operation.amount),
                    id,
                    format_cents(receipt.balance)
                );
            }

            Commands::Withdraw { account, amount } => {
                let service = connect(&config).await?;
                let id = parse_account_id(&account)?;
                let receipt = service.withdraw(id, parse_amount(&amount)?).await?;
                println!(
                    "Withdrew {} from {} (balance {})",
                    format_cents(receipt.operation.amount),
                    id,
                    format_cents(receipt.balance)
                );
            }

            Commands::Transfer { amount, from, to } => {
                let service = connect(&config).await?;
                let sender = parse_account_id(&from)?;
                let recipient = parse_account_id(&to)?;
                let receipt = service
                    .transfer(sender, recipient, parse_amount(&amount)?)
                    .await?;
                println!(
                    "Transferred {} {} -> {}",
                    format_cents(receipt.withdrawal.amount),
                    sender,
                    recipient
                );
                println!(
                    "  balances: {} {}, {} {}",
                    sender,
                    format_cents(receipt.sender_balance),
                    recipient,
                    format_cents(receipt.recipient_balance)
                );
            }

            Commands::Operations {
                account,
                from,
                to,
                format,
            } => {
                let service = connect(&config).await?;
                let id = parse_account_id(&account)?;
                let from = from
                    .as_deref()
                    .map(parse_instant)
                    .transpose()
                    .context("Invalid --from")?;
                let to = to
                    .as_deref()
                    .map(parse_instant_until)
                    .transpose()
                    .context("Invalid --to")?;
                run_operations_command(&service, id, from, to, format).await?;
            }

            Commands::Check => {
                let service = connect(&config).await?;
                run_check_command(&service).await?;
            }

            Commands::Seed {
                accounts,
                transfers,
                rng_seed,
            } => {
                let service = connect(&config).await?;
                let seed_config = SeedConfig {
                    min_accounts: accounts,
                    transfers,
                    rng_seed,
                    ..SeedConfig::default()
                };
                let summary = Seeder::new(&service, seed_config).run().await?;
                println!("Accounts created:    {}", summary.accounts_created);
                println!("Operations recorded: {}", summary.operations_recorded);
                println!("Withdrawals skipped: {}", summary.withdrawals_skipped);
                println!("Transfers recorded:  {}", summary.transfers_recorded);
                println!("Transfers skipped:   {}", summary.transfers_skipped);
            }
        }

        Ok(())
    }
}

async fn connect(config: &LedgerConfig) -> Result<LedgerService> {
    LedgerService::connect(config).await.with_context(|| {
        format!(
            "Cannot open {} (run `tally init` first?)",
            config.database_path.display()
        )
    })
}

async fn run_accounts_command(service: &LedgerService) -> Result<()> {
    let accounts = service.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("{:<38} {:>14} CREATED", "ACCOUNT", "BALANCE");
    println!("{}", "-".repeat(72));
    for account in accounts {
        println!(
            "{:<38} {:>14} {}",
            account.id,
            format_cents(account.balance),
            account.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn run_operations_command(
    service: &LedgerService,
    account_id: AccountId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            Exporter::new(service)
                .export_history_json(std::io::stdout(), account_id, from, to)
                .await?;
            println!();
        }
        OutputFormat::Csv => {
            let operations = service.operation_history(account_id, from, to).await?;
            write_operations_csv(std::io::stdout(), &operations)?;
        }
        OutputFormat::Table => {
            let operations = service.operation_history(account_id, from, to).await?;
            print_operations_table(&operations);
        }
    }
    Ok(())
}

fn print_operations_table(operations: &[Operation]) {
    if operations.is_empty() {
        println!("No operations found.");
        return;
    }

    println!("{:<8} {:<28} {:<12} {:>14}", "SEQ", "CREATED", "TYPE", "AMOUNT");
    println!("{}", "-".repeat(65));
    for op in operations {
        println!(
            "{:<8} {:<28} {:<12} {:>14}",
            op.sequence,
            op.created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            op.operation_type,
            format_cents(op.amount)
        );
    }
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:   {}", report.account_count);
    println!("Operations: {}", report.operation_count);
    println!();

    for id in &report.negative_balances {
        println!("  NEGATIVE BALANCE  {}", id);
    }
    for mismatch in &report.mismatches {
        println!(
            "  MISMATCH          {} stored {} but history gives {}",
            mismatch.account_id,
            format_cents(mismatch.stored),
            format_cents(mismatch.replayed)
        );
    }
    if report.invalid_amounts > 0 {
        println!("  {} operation(s) with a negative amount", report.invalid_amounts);
    }
    if report.orphaned_operations > 0 {
        println!(
            "  {} operation(s) referencing unknown accounts",
            report.orphaned_operations
        );
    }

    if report.is_healthy() {
        println!("Ledger is consistent.");
        Ok(())
    } else {
        anyhow::bail!("Ledger integrity check failed")
    }
}

fn parse_account_id(input: &str) -> Result<AccountId> {
    Uuid::parse_str(input.trim()).with_context(|| format!("Invalid account ID '{}' (expected UUID)", input))
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

/// Parse a UTC instant: `YYYY-MM-DDTHH:MM:SS`, RFC 3339, or a bare date
/// (midnight).
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>> {
    match parse_time(input)? {
        TimeInput::Instant(instant) => Ok(instant),
        TimeInput::Date(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| anyhow::anyhow!("Invalid date")),
    }
}

/// Like [`parse_instant`], but a bare date means the last microsecond of
/// that day, so an inclusive upper bound covers the whole day.
pub fn parse_instant_until(input: &str) -> Result<DateTime<Utc>> {
    match parse_time(input)? {
        TimeInput::Instant(instant) => Ok(instant),
        TimeInput::Date(date) => date
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| anyhow::anyhow!("Invalid date")),
    }
}

enum TimeInput {
    Instant(DateTime<Utc>),
    Date(NaiveDate),
}

fn parse_time(input: &str) -> Result<TimeInput> {
    let input = input.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(TimeInput::Instant(naive.and_utc()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(TimeInput::Instant(dt.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").with_context(|| {
        format!(
            "Time must be YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD, got '{}'",
            input
        )
    })?;
    Ok(TimeInput::Date(date))
}
