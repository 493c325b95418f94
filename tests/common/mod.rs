// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use tally::application::LedgerService;
use tally::config::LedgerConfig;
use tally::domain::{AccountId, Cents};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = LedgerConfig::new(temp_dir.path().join("test.db"));
    let service = LedgerService::init(&config).await?;
    Ok((service, temp_dir))
}

/// Config pointing at a fresh database file inside a temporary directory
pub fn test_config() -> Result<(LedgerConfig, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = LedgerConfig::new(temp_dir.path().join("test.db"));
    Ok((config, temp_dir))
}

/// Whole currency units to cents
pub fn units(amount: i64) -> Cents {
    amount * 100
}

/// Open an account funded with an opening deposit
pub async fn funded_account(service: &LedgerService, balance: Cents) -> Result<AccountId> {
    Ok(service.open_account(balance).await?.id)
}

pub async fn balance_of(service: &LedgerService, account: AccountId) -> Result<Cents> {
    service
        .get_balance(account)
        .await?
        .ok_or_else(|| anyhow::anyhow!("account {} vanished", account))
}

/// Let the clock move on so consecutive operations get distinct timestamps
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
