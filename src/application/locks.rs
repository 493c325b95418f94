use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::AccountId;

/// One async mutex per account.
///
/// Everything that reads a balance, decides, and writes it back holds the
/// account's lock for the whole sequence. Several accounts are always locked
/// in ascending id order, so two transfers in opposite directions cannot
/// deadlock.
#[derive(Default)]
pub struct AccountLocks {
    slots: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop. Slots nobody else is holding or waiting
/// for are dropped from the registry at the same time.
pub struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    ids: Vec<AccountId>,
    held: Vec<OwnedMutexGuard<()>>,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        self.held.clear();
        self.locks.release(&self.ids);
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: AccountId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id).or_default().clone()
    }

    /// Forget slots whose only remaining reference is the registry's own.
    fn release(&self, ids: &[AccountId]) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if slots.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(id);
            }
        }
    }

    pub async fn lock(&self, id: AccountId) -> AccountGuard<'_> {
        self.lock_all(&[id]).await
    }

    /// Lock every listed account, in canonical order, ignoring duplicates.
    pub async fn lock_all(&self, ids: &[AccountId]) -> AccountGuard<'_> {
        let mut ordered = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        // Built up front so a cancelled acquisition still cleans up its slots.
        let mut guard = AccountGuard {
            locks: self,
            ids: ordered.clone(),
            held: Vec::with_capacity(ordered.len()),
        };
        for id in ordered {
            let slot = self.slot(id);
            guard.held.push(slot.lock_owned().await);
        }

        guard
    }

    /// Number of accounts currently locked or waited on.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
