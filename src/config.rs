//! Runtime configuration for the ledger and the seeder.

use std::path::PathBuf;
use std::time::Duration;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// How long a writer waits for another writer's transaction to finish
    pub busy_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tally.db"),
            max_connections: 8,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

/// Test-data seeding configuration
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Accounts are created until at least this many exist
    pub min_accounts: usize,
    /// Opening deposits are drawn from `0..max_opening_units` whole units
    pub max_opening_units: i64,
    /// Random deposits/withdrawals per account when backfilling history
    pub operations_per_account: std::ops::Range<usize>,
    /// Operation sizes are drawn from `1..=max_operation_units` whole units
    pub max_operation_units: i64,
    /// Synthetic transfers between random accounts
    pub transfers: usize,
    /// Fixed RNG seed for reproducible data
    pub rng_seed: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            min_accounts: 100,
            max_opening_units: 10_000,
            operations_per_account: 10..30,
            max_operation_units: 1_000,
            transfers: 50,
            rng_seed: None,
        }
    }
}
