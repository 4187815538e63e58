//! In-memory balance store
//!
//! This module provides the `InMemoryBalanceStore` struct, which keeps account
//! rows in a concurrent map and gives every row its own async mutex.
//!
//! # Design
//!
//! `DashMap` shards the account map so lookups of different accounts do not
//! contend. The map only hands out `Arc` handles to rows; the row mutex is
//! then held across the whole read-modify-write of an atomic update. That
//! serializes all updates to the same account, including compensating ones,
//! while updates to different accounts proceed in parallel.
//!
//! # Thread Safety
//!
//! No shard guard is ever held across an `.await`: the row handle is cloned
//! out of the map before the row lock is awaited.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{BalanceChange, BalanceStore};
use crate::types::{Account, AccountId, LedgerError, RequestViolation, TransactionKind};

/// Thread-safe account balances with row-level exclusivity
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    /// Account rows by ID, each guarded by its own lock
    accounts: DashMap<AccountId, Arc<Mutex<Account>>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts held
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn row(&self, account_id: &AccountId) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.accounts
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        if account.balance < Decimal::ZERO {
            return Err(LedgerError::invalid_request(
                RequestViolation::NegativeInitialBalance(account.balance),
            ));
        }

        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateAccount {
                account_id: account.id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(account)));
                Ok(())
            }
        }
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        let row = self.row(account_id)?;
        let account = row.lock().await;
        Ok(account.clone())
    }

    async fn atomic_update(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        let row = self.row(account_id)?;
        let mut account = row.lock().await;

        let previous = account.balance;
        let new = match kind {
            TransactionKind::Deposit => previous
                .checked_add(amount)
                .ok_or_else(|| LedgerError::ArithmeticOverflow {
                    account_id: account_id.clone(),
                })?,
            TransactionKind::Withdraw => {
                if previous < amount {
                    return Err(LedgerError::insufficient_funds(account_id, previous, amount));
                }
                previous - amount
            }
        };

        // Only reached once the new balance is known to be valid
        account.balance = new;
        account.updated_at = Utc::now();

        debug!(account_id = %account_id, %kind, %amount, %previous, %new, "Balance updated");
        Ok(BalanceChange { previous, new })
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}
