mod common;

use anyhow::Result;
use common::{funded_account, test_service, units};
use tally::config::SeedConfig;
use tally::seed::Seeder;

fn small_config(seed: u64) -> SeedConfig {
    SeedConfig {
        min_accounts: 6,
        max_opening_units: 500,
        operations_per_account: 2..5,
        max_operation_units: 200,
        transfers: 10,
        rng_seed: Some(seed),
    }
}

#[tokio::test]
async fn test_seed_populates_consistent_ledger() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let summary = Seeder::new(&service, small_config(7)).run().await?;

    assert_eq!(summary.accounts_created, 6);
    assert_eq!(service.count_accounts().await?, 6);
    assert_eq!(
        service.count_operations().await?,
        (summary.operations_recorded + 2 * summary.transfers_recorded) as i64
    );
    assert_eq!(summary.transfers_recorded + summary.transfers_skipped, 10);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "unexpected report: {:?}", report);
    for account in service.list_accounts().await? {
        assert!(account.balance >= 0);
    }

    Ok(())
}

#[tokio::test]
async fn test_seed_rerun_adds_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;

    Seeder::new(&service, small_config(11)).run().await?;
    let accounts = service.count_accounts().await?;
    let operations = service.count_operations().await?;

    let again = Seeder::new(&service, small_config(12)).run().await?;
    assert_eq!(again.accounts_created, 0);
    assert_eq!(again.transfers_recorded, 0);
    assert_eq!(service.count_accounts().await?, accounts);
    assert_eq!(service.count_operations().await?, operations);

    Ok(())
}

#[tokio::test]
async fn test_seed_tops_up_accounts_without_backfill_when_history_exists() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let existing = funded_account(&service, units(10)).await?;

    let summary = Seeder::new(&service, small_config(3)).run().await?;

    assert_eq!(summary.accounts_created, 5);
    assert_eq!(summary.transfers_recorded, 0);
    assert_eq!(service.count_accounts().await?, 6);
    assert_eq!(
        service.operation_history(existing, None, None).await?.len(),
        1
    );
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}
