//! Random test data, produced through the regular ledger operations so that
//! every seeded balance is explained by its operation history.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::application::{AppError, LedgerService};
use crate::config::SeedConfig;
use crate::domain::{AccountId, Cents};

/// What a seeding run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub accounts_created: usize,
    pub operations_recorded: usize,
    pub withdrawals_skipped: usize,
    pub transfers_recorded: usize,
    pub transfers_skipped: usize,
}

pub struct Seeder<'a> {
    service: &'a LedgerService,
    config: SeedConfig,
    rng: StdRng,
}

impl<'a> Seeder<'a> {
    pub fn new(service: &'a LedgerService, config: SeedConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            service,
            config,
            rng,
        }
    }

    /// Top up the account population, then, only if the ledger had no
    /// history before this run, backfill random operations and transfers.
    pub async fn run(&mut self) -> Result<SeedSummary, AppError> {
        let mut summary = SeedSummary::default();
        let history_was_empty = self.service.count_operations().await? == 0;

        self.ensure_accounts(&mut summary).await?;

        if history_was_empty {
            self.backfill_operations(&mut summary).await?;
            self.generate_transfers(&mut summary).await?;
        } else {
            debug!("ledger already has history, skipping backfill");
        }

        info!(
            accounts = summary.accounts_created,
            operations = summary.operations_recorded,
            transfers = summary.transfers_recorded,
            "seeding finished"
        );
        Ok(summary)
    }

    async fn ensure_accounts(&mut self, summary: &mut SeedSummary) -> Result<(), AppError> {
        let existing = usize::try_from(self.service.count_accounts().await?).unwrap_or(0);
        let needed = self.config.min_accounts.saturating_sub(existing);
        if needed == 0 {
            return Ok(());
        }

        let accounts = self.service.open_accounts(needed).await?;
        for account in &accounts {
            let opening = self.rng.gen_range(0..self.config.max_opening_units.max(1)) * 100;
            if opening > 0 {
                self.service.deposit(account.id, opening).await?;
                summary.operations_recorded += 1;
            }
        }

        summary.accounts_created = accounts.len();
        Ok(())
    }

    async fn backfill_operations(&mut self, summary: &mut SeedSummary) -> Result<(), AppError> {
        let accounts = self.service.list_accounts().await?;

        for account in accounts {
            let count = if self.config.operations_per_account.is_empty() {
                0
            } else {
                self.rng.gen_range(self.config.operations_per_account.clone())
            };

            for _ in 0..count {
                let amount = self.random_operation_amount();
                let result = if self.rng.gen_bool(0.5) {
                    self.service.deposit(account.id, amount).await
                } else {
                    self.service.withdraw(account.id, amount).await
                };

                match result {
                    Ok(_) => summary.operations_recorded += 1,
                    Err(AppError::InsufficientFunds { .. }) => summary.withdrawals_skipped += 1,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    async fn generate_transfers(&mut self, summary: &mut SeedSummary) -> Result<(), AppError> {
        let ids: Vec<AccountId> = self
            .service
            .list_accounts()
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();
        if ids.len() < 2 {
            return Ok(());
        }

        for _ in 0..self.config.transfers {
            let sender = ids[self.rng.gen_range(0..ids.len())];
            let recipient = loop {
                let candidate = ids[self.rng.gen_range(0..ids.len())];
                if candidate != sender {
                    break candidate;
                }
            };

            let balance = self.service.get_balance(sender).await?.unwrap_or(0);
            let amount = half_rounded_up(balance);
            if amount == 0 {
                summary.transfers_skipped += 1;
                continue;
            }

            match self.service.transfer(sender, recipient, amount).await {
                Ok(_) => summary.transfers_recorded += 1,
                Err(e) if e.is_rejection() => summary.transfers_skipped += 1,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn random_operation_amount(&mut self) -> Cents {
        self.rng.gen_range(1..=self.config.max_operation_units.max(1)) * 100
    }
}

/// Half of a balance, rounding a trailing half cent up.
fn half_rounded_up(balance: Cents) -> Cents {
    balance / 2 + balance % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_rounded_up() {
        assert_eq!(half_rounded_up(0), 0);
        assert_eq!(half_rounded_up(1), 1);
        assert_eq!(half_rounded_up(10000), 5000);
        assert_eq!(half_rounded_up(10001), 5001);
    }
}
