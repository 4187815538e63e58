//! Thread-safe in-memory ledger store
//!
//! This module provides the `InMemoryLedgerStore` struct, which keeps
//! transaction records using concurrent data structures so that producers,
//! workers and readers can access it from many tasks at once.
//!
//! # Design
//!
//! Records live in a `DashMap` keyed by transaction ID. A second `DashMap`
//! indexes record IDs per account in insertion order, which is what history
//! paging walks (newest first).
//!
//! # Immutability
//!
//! A record may be rewritten only while it is pending. Once it reaches
//! `completed` or `failed`, every further write is refused with `NotPending`.
//! The check and the write happen under the same shard lock, so two racing
//! writers can never both move a record out of pending.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::traits::{HistoryPage, LedgerStore};
use crate::types::{AccountId, LedgerError, Transaction, TransactionId, TransactionStatus};

/// Thread-safe ledger of transaction records
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    /// Records by transaction ID
    transactions: DashMap<TransactionId, Transaction>,

    /// Record IDs per account, oldest first
    by_account: DashMap<AccountId, Vec<TransactionId>>,
}

impl InMemoryLedgerStore {
    /// Create a new empty ledger store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held across all accounts
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Apply `change` to a pending record under its shard lock
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The record was pending and has been rewritten
    /// * `Err(TransactionNotFound)` - No record with this ID
    /// * `Err(NotPending)` - The record is already terminal; nothing changed
    fn modify_pending<F>(&self, transaction_id: &TransactionId, change: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut record = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))?;

        if record.status.is_terminal() {
            return Err(LedgerError::not_pending(transaction_id, record.status));
        }

        change(record.value_mut());
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let transaction_id = transaction.id.clone();
        let account_id = transaction.account_id.clone();

        match self.transactions.entry(transaction_id.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::DuplicateTransaction { transaction_id });
            }
            Entry::Vacant(slot) => {
                slot.insert(transaction);
            }
        }

        self.by_account
            .entry(account_id)
            .or_default()
            .push(transaction_id);
        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.modify_pending(&transaction.id, |record| *record = transaction.clone())
    }

    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: Option<String>,
    ) -> Result<(), LedgerError> {
        self.modify_pending(transaction_id, |record| {
            record.status = status;
            record.error_message = error_message;
        })
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Transaction, LedgerError> {
        self.transactions
            .get(transaction_id)
            .map(|record| record.value().clone())
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: usize,
        limit: usize,
    ) -> Result<HistoryPage, LedgerError> {
        let ids = self
            .by_account
            .get(account_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();

        let offset = page.saturating_sub(1).saturating_mul(limit);
        let transactions = ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.transactions.get(id).map(|record| record.value().clone()))
            .collect();

        Ok(HistoryPage {
            transactions,
            page,
            limit,
            total: ids.len(),
        })
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}
