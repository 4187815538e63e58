//! Transaction processing engine
//!
//! This module provides the `TransactionEngine` struct, which applies deposits
//! and withdrawals across two independent stores: the balance store (the
//! authoritative amount) and the ledger store (the history). The stores offer
//! no shared transaction, so every operation is ordered so that a failure can
//! be undone:
//!
//! 1. mutate the balance atomically
//! 2. write the ledger record
//! 3. if the ledger write fails, apply the inverse mutation
//!
//! # Architecture
//!
//! ```text
//! TransactionEngine
//!     ├── Arc<dyn BalanceStore>   (authoritative balances)
//!     ├── Arc<dyn LedgerStore>    (transaction records)
//!     ├── claims                  (one in-flight processor per pending record)
//!     ├── settled                 (wakes callers waiting on pending records)
//!     └── ReconciliationLog       (divergences compensation could not repair)
//! ```
//!
//! # Paths
//!
//! - **Synchronous**: `process_sync` mutates the balance and inserts a
//!   completed record.
//! - **Asynchronous**: a producer persists a pending record through
//!   `create_pending`, a worker later drives it to `completed` or `failed`
//!   through `process_pending`.
//!
//! # Thread Safety
//!
//! The engine is shared behind an `Arc` by producers and every worker. Two
//! deliveries of the same intent processed at once are serialized on a
//! per-record claim, and the loser observes the record as no longer pending.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::reconciliation::{ReconciliationEntry, ReconciliationLog};
use super::traits::{BalanceStore, LedgerStore};
use crate::types::{
    AccountId, ErrorClass, LedgerError, Transaction, TransactionId, TransactionKind,
    TransactionRequest, TransactionStatus,
};

/// Reason recorded when the final record write of an async transaction fails
pub const RECORD_UPDATE_FAILED: &str = "failed to update transaction record";

/// Orchestrates balance mutations and ledger writes with compensation
pub struct TransactionEngine {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,

    /// Per-record locks held while a pending record is being processed
    claims: DashMap<TransactionId, Arc<Mutex<()>>>,

    /// Notified whenever a record may have left `pending`
    settled: Notify,

    reconciliation: ReconciliationLog,
}

impl TransactionEngine {
    /// Create a new engine over the two stores
    ///
    /// # Arguments
    ///
    /// * `balances` - Store holding the authoritative account balances
    /// * `ledger` - Store holding transaction records
    pub fn new(balances: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            balances,
            ledger,
            claims: DashMap::new(),
            settled: Notify::new(),
            reconciliation: ReconciliationLog::new(),
        }
    }

    pub fn balances(&self) -> &Arc<dyn BalanceStore> {
        &self.balances
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Divergences that compensation could not repair
    pub fn reconciliation(&self) -> &ReconciliationLog {
        &self.reconciliation
    }

    /// Apply a transaction immediately and record it as completed
    ///
    /// # Arguments
    ///
    /// * `account_id` - The account to mutate
    /// * `request` - Kind, amount and description of the transaction
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - The completed record, whose balances are the ones
    ///   observed by the atomic update
    /// * `Err(InvalidRequest)` - Unknown kind or non-positive amount; nothing
    ///   was touched
    /// * `Err(_)` - Any balance store error, unchanged; nothing was written
    /// * `Err(LedgerWriteFailed)` - The balance was mutated but the record
    ///   could not be written; `compensated` tells whether the mutation was
    ///   undone
    pub async fn process_sync(
        &self,
        account_id: &AccountId,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        let kind = request.validate()?;

        let change = self
            .balances
            .atomic_update(account_id, kind, request.amount)
            .await?;

        let transaction = Transaction::completed(
            account_id.clone(),
            kind,
            request.amount,
            change.previous,
            change.new,
            request.description.clone(),
        );

        if let Err(write_error) = self.ledger.create(transaction.clone()).await {
            error!(
                transaction_id = %transaction.id,
                account_id = %account_id,
                error = %write_error,
                "Ledger write failed after balance update, compensating"
            );
            let compensated = self
                .compensate(&transaction.id, account_id, kind, request.amount, &write_error)
                .await;
            return Err(LedgerError::LedgerWriteFailed {
                transaction_id: transaction.id,
                message: write_error.to_string(),
                compensated,
            });
        }

        info!(
            transaction_id = %transaction.id,
            account_id = %account_id,
            %kind,
            amount = %request.amount,
            new_balance = %transaction.new_balance,
            "Transaction completed"
        );
        Ok(transaction)
    }

    /// Persist a pending record for later processing by a worker
    ///
    /// The record is forced into the pending shape (pending status, zero
    /// `new_balance`, no error message) before it is written.
    pub async fn create_pending(&self, mut transaction: Transaction) -> Result<Transaction, LedgerError> {
        transaction.status = TransactionStatus::Pending;
        transaction.new_balance = Decimal::ZERO;
        transaction.error_message = None;

        self.ledger.create(transaction.clone()).await?;

        debug!(
            transaction_id = %transaction.id,
            account_id = %transaction.account_id,
            "Pending transaction recorded"
        );
        Ok(transaction)
    }

    /// Drive a pending record to a terminal status
    ///
    /// Concurrent calls for the same record are serialized; only the first
    /// sees it pending, every later one fails with `NotPending` and changes
    /// nothing.
    ///
    /// # Arguments
    ///
    /// * `transaction_id` - The pending record to process
    /// * `request` - Kind, amount and description carried by the intent
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - The completed record
    /// * `Err(TransactionNotFound)` - No such record
    /// * `Err(NotPending)` - Already completed or failed
    /// * `Err(InvalidRequest | InsufficientFunds | AccountNotFound | ..)` -
    ///   The record has been marked failed with this error's message
    /// * `Err(Storage)` - A store is unavailable; the record is left pending
    ///   so a redelivery can retry it
    /// * `Err(LedgerWriteFailed)` - The completed record could not be written
    ///   after the balance moved; see `compensated`
    pub async fn process_pending(
        &self,
        transaction_id: &TransactionId,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        let claim = Arc::clone(self.claims.entry(transaction_id.clone()).or_default().value());

        let result = {
            let _guard = claim.lock().await;
            self.apply_pending(transaction_id, request)
                .instrument(info_span!("process_pending", transaction_id = %transaction_id))
                .await
        };

        drop(claim);
        self.claims
            .remove_if(transaction_id, |_, claim| Arc::strong_count(claim) == 1);
        self.settled.notify_waiters();

        result
    }

    /// Wait until a record is `completed` or `failed` and return it
    ///
    /// Does not return while the record stays pending, so callers bound it
    /// with a timeout.
    pub async fn wait_settled(&self, transaction_id: &TransactionId) -> Result<Transaction, LedgerError> {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let record = self.ledger.get(transaction_id).await?;
            if record.status != TransactionStatus::Pending {
                return Ok(record);
            }

            notified.await;
        }
    }

    async fn apply_pending(
        &self,
        transaction_id: &TransactionId,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        let record = self.ledger.get(transaction_id).await?;
        if record.status != TransactionStatus::Pending {
            debug!(status = %record.status, "Transaction already processed, skipping");
            return Err(LedgerError::not_pending(transaction_id, record.status));
        }

        let kind = match request.validate() {
            Ok(kind) => kind,
            Err(invalid) => {
                self.mark_failed(transaction_id, &invalid.to_string()).await?;
                return Err(invalid);
            }
        };

        let change = match self
            .balances
            .atomic_update(&record.account_id, kind, request.amount)
            .await
        {
            Ok(change) => change,
            Err(update_error) => {
                if update_error.class() == ErrorClass::System {
                    warn!(error = %update_error, "Balance store unavailable, leaving transaction pending");
                } else {
                    self.mark_failed(transaction_id, &update_error.to_string())
                        .await?;
                }
                return Err(update_error);
            }
        };

        let completed = Transaction {
            kind,
            amount: request.amount,
            previous_balance: change.previous,
            new_balance: change.new,
            status: TransactionStatus::Completed,
            error_message: None,
            ..record
        };

        if let Err(write_error) = self.ledger.update(&completed).await {
            error!(
                account_id = %completed.account_id,
                error = %write_error,
                "Failed to complete transaction record, compensating"
            );
            let compensated = self
                .compensate(
                    transaction_id,
                    &completed.account_id,
                    kind,
                    request.amount,
                    &write_error,
                )
                .await;
            if let Err(mark_error) = self.mark_failed(transaction_id, RECORD_UPDATE_FAILED).await {
                warn!(error = %mark_error, "Could not mark transaction failed after write failure");
            }
            return Err(LedgerError::LedgerWriteFailed {
                transaction_id: transaction_id.clone(),
                message: write_error.to_string(),
                compensated,
            });
        }

        info!(
            account_id = %completed.account_id,
            %kind,
            amount = %completed.amount,
            new_balance = %completed.new_balance,
            "Pending transaction completed"
        );
        Ok(completed)
    }

    /// Move a pending record to `failed` with a reason
    ///
    /// Used by producers when the intent for a pending record could not be
    /// published.
    pub async fn fail_pending(
        &self,
        transaction_id: &TransactionId,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.ledger
            .update_status(transaction_id, TransactionStatus::Failed, Some(reason.to_string()))
            .await?;
        self.settled.notify_waiters();
        Ok(())
    }

    /// Record a terminal failure, surfacing a system error if that write fails
    ///
    /// A failure to persist the failed status must not be reported as the
    /// original business error, otherwise the intent would be acknowledged
    /// and the record left pending forever.
    async fn mark_failed(&self, transaction_id: &TransactionId, reason: &str) -> Result<(), LedgerError> {
        match self.fail_pending(transaction_id, reason).await {
            Ok(()) => {
                info!(reason, "Transaction marked failed");
                Ok(())
            }
            Err(mark_error) => {
                warn!(error = %mark_error, reason, "Failed to mark transaction failed");
                Err(LedgerError::storage(
                    "ledger",
                    format!("could not mark transaction {} failed: {}", transaction_id, mark_error),
                ))
            }
        }
    }

    /// Undo a balance mutation whose ledger record could not be written
    ///
    /// Returns whether the inverse mutation succeeded. When it does not, the
    /// divergence is logged as an alert and kept in the reconciliation log.
    async fn compensate(
        &self,
        transaction_id: &TransactionId,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Decimal,
        write_error: &LedgerError,
    ) -> bool {
        match self
            .balances
            .atomic_update(account_id, kind.inverse(), amount)
            .await
        {
            Ok(change) => {
                warn!(
                    transaction_id = %transaction_id,
                    account_id = %account_id,
                    restored_balance = %change.new,
                    "Balance compensated after ledger write failure"
                );
                true
            }
            Err(compensation_error) => {
                error!(
                    alert = true,
                    transaction_id = %transaction_id,
                    account_id = %account_id,
                    %kind,
                    %amount,
                    ledger_error = %write_error,
                    compensation_error = %compensation_error,
                    "CRITICAL: compensation failed, balance and ledger disagree"
                );
                self.reconciliation.record(ReconciliationEntry {
                    transaction_id: transaction_id.clone(),
                    account_id: account_id.clone(),
                    kind,
                    amount,
                    ledger_error: write_error.to_string(),
                    compensation_error: compensation_error.to_string(),
                    recorded_at: chrono::Utc::now(),
                });
                false
            }
        }
    }
}
