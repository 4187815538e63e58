//! Storage capability traits
//!
//! The balance store and the ledger store are independent backends that can
//! fail independently. The engine only ever talks to them through these
//! traits, so production backends, the in-memory stores and the
//! fault-injecting wrappers are interchangeable.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{
    Account, AccountId, LedgerError, Transaction, TransactionId, TransactionKind,
    TransactionStatus,
};

/// Balances observed on either side of an atomic update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub previous: Decimal,
    pub new: Decimal,
}

/// One page of an account's transaction history, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub transactions: Vec<Transaction>,
    pub page: usize,
    pub limit: usize,
    /// Number of records for the account across all pages
    pub total: usize,
}

/// Authoritative per-account balances
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Insert a new account row
    async fn create_account(&self, account: Account) -> Result<(), LedgerError>;

    /// Read an account, failing with `AccountNotFound` if absent
    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError>;

    /// Atomically apply a deposit or withdrawal to one account
    ///
    /// Holds exclusive access to the account row for the whole
    /// read-then-write, so no other update of the same account can observe or
    /// apply a balance in between. A failed update leaves the balance exactly
    /// as it was.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` - the row does not exist
    /// * `InsufficientFunds` - a withdrawal exceeds the current balance
    async fn atomic_update(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), LedgerError>;
}

/// Durable transaction history keyed by transaction ID
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new record, failing with `DuplicateTransaction` on ID reuse
    async fn create(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Replace a pending record with its new state
    ///
    /// Records that already reached a terminal status are immutable; writing
    /// to one fails with `NotPending`.
    async fn update(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    /// Set the status (and optional error message) of a pending record
    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: Option<String>,
    ) -> Result<(), LedgerError>;

    /// Read a record, failing with `TransactionNotFound` if absent
    async fn get(&self, transaction_id: &TransactionId) -> Result<Transaction, LedgerError>;

    /// Page through an account's records, newest first
    ///
    /// `page` is 1-based.
    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: usize,
        limit: usize,
    ) -> Result<HistoryPage, LedgerError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), LedgerError>;
}
