//! Producer-facing ledger service
//!
//! `LedgerService` is what callers use to open accounts, submit transactions
//! and read history. It chooses between the synchronous engine path and the
//! queued path for each submission:
//!
//! - **sync**: the engine applies the transaction and returns the completed
//!   record
//! - **async**: a pending record is persisted and its intent published; the
//!   caller gets the pending record back and either polls `get_transaction`
//!   or waits for it with `wait_settled`
//!
//! If the intent cannot be published, the pending record is marked failed and
//! that one request falls back to the synchronous path.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::engine::TransactionEngine;
use super::traits::{BalanceStore, HistoryPage, LedgerStore};
use crate::queue::MessageChannel;
use crate::types::{
    check_money_precision, Account, AccountId, Intent, LedgerError, RequestViolation,
    Transaction, TransactionId, TransactionKind, TransactionRequest,
};

/// Reason recorded on a pending record whose intent could not be published
pub const QUEUE_UNAVAILABLE_REASON: &str = "queue system unavailable";

/// Description of the record written for a non-zero opening balance
pub const INITIAL_DEPOSIT_DESCRIPTION: &str = "Initial deposit";

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Which path handled a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Sync,
    Async,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Sync => f.write_str("sync"),
            ProcessingMode::Async => f.write_str("async"),
        }
    }
}

/// Outcome of `submit_transaction`
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Completed record on the sync path, pending record on the async path
    pub transaction: Transaction,
    pub mode: ProcessingMode,
}

/// Snapshot of how submissions are currently being handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingModeReport {
    pub mode: ProcessingMode,
    /// `connected` or `disconnected`; `disabled` when no channel is configured
    pub queue: &'static str,
    pub async_enabled: bool,
}

/// Probe result for one backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_ping(ping: Result<(), LedgerError>) -> Self {
        match ping {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Readiness of the service and everything it depends on
///
/// The queue is reported but does not affect `ready`: without it every
/// submission still runs synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub balance_store: ComponentHealth,
    pub ledger_store: ComponentHealth,
    pub processing: ProcessingModeReport,
}

/// Entry point for producers
pub struct LedgerService {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,
    engine: Arc<TransactionEngine>,
    channel: Option<Arc<dyn MessageChannel>>,
}

impl LedgerService {
    /// Create a new service
    ///
    /// # Arguments
    ///
    /// * `engine` - The shared engine; its stores are used for reads
    /// * `channel` - Message channel for the queued path, or `None` to run
    ///   every submission synchronously
    pub fn new(engine: Arc<TransactionEngine>, channel: Option<Arc<dyn MessageChannel>>) -> Self {
        Self {
            balances: Arc::clone(engine.balances()),
            ledger: Arc::clone(engine.ledger()),
            engine,
            channel,
        }
    }

    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Open a new account
    ///
    /// A positive opening balance is applied through the engine as an
    /// "Initial deposit" record, so the account's history always explains
    /// its balance.
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The account as stored after the opening deposit
    /// * `Err(InvalidRequest)` - Empty owner, negative or over-precise balance
    /// * `Err(AccountOpeningFailed)` - The account was stored but the opening
    ///   deposit failed; it stays in the store with a zero balance under the
    ///   returned `account_id`
    pub async fn create_account(
        &self,
        owner: &str,
        initial_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(LedgerError::invalid_request(RequestViolation::EmptyOwner));
        }
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::invalid_request(
                RequestViolation::NegativeInitialBalance(initial_balance),
            ));
        }
        check_money_precision(initial_balance)?;

        let account = Account::new(owner, Decimal::ZERO);
        let account_id = account.id.clone();
        self.balances.create_account(account).await?;

        if initial_balance > Decimal::ZERO {
            let opening = TransactionRequest::new(
                TransactionKind::Deposit.as_str(),
                initial_balance,
                INITIAL_DEPOSIT_DESCRIPTION,
            );
            if let Err(opening_error) = self.engine.process_sync(&account_id, &opening).await {
                warn!(
                    account_id = %account_id,
                    error = %opening_error,
                    "Opening deposit failed, account left at zero balance"
                );
                return Err(LedgerError::AccountOpeningFailed {
                    account_id,
                    cause: Box::new(opening_error),
                });
            }
        }

        info!(account_id = %account_id, owner, %initial_balance, "Account created");
        self.balances.get_account(&account_id).await
    }

    pub async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.balances.get_account(account_id).await
    }

    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Decimal, LedgerError> {
        Ok(self.balances.get_account(account_id).await?.balance)
    }

    /// Wait for a queued transaction to reach `completed` or `failed`
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - The terminal record
    /// * `Err(SettleTimeout)` - Still pending after `timeout`
    /// * `Err(TransactionNotFound)` - No such record
    pub async fn wait_settled(
        &self,
        transaction_id: &TransactionId,
        timeout: Duration,
    ) -> Result<Transaction, LedgerError> {
        tokio::time::timeout(timeout, self.engine.wait_settled(transaction_id))
            .await
            .map_err(|_| LedgerError::SettleTimeout {
                transaction_id: transaction_id.clone(),
            })?
    }

    /// Whether the queued path can currently be used
    pub fn is_async_available(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.is_healthy())
    }

    pub fn processing_mode(&self) -> ProcessingModeReport {
        let async_enabled = self.is_async_available();
        let queue = match &self.channel {
            None => "disabled",
            Some(channel) if channel.is_healthy() => "connected",
            Some(_) => "disconnected",
        };
        ProcessingModeReport {
            mode: if async_enabled {
                ProcessingMode::Async
            } else {
                ProcessingMode::Sync
            },
            queue,
            async_enabled,
        }
    }

    /// Probe both stores and report the processing mode
    pub async fn readiness(&self) -> ReadinessReport {
        let balance_store = ComponentHealth::from_ping(self.balances.ping().await);
        let ledger_store = ComponentHealth::from_ping(self.ledger.ping().await);
        let ready = balance_store.healthy && ledger_store.healthy;
        if !ready {
            warn!(
                balance_store = ?balance_store.error,
                ledger_store = ?ledger_store.error,
                "Service not ready"
            );
        }

        ReadinessReport {
            ready,
            balance_store,
            ledger_store,
            processing: self.processing_mode(),
        }
    }

    /// Submit a deposit or withdrawal
    ///
    /// # Arguments
    ///
    /// * `account_id` - The account to mutate
    /// * `request` - Raw request; validated for kind, sign, precision and limit
    /// * `prefer_async` - Queue the transaction when a healthy channel exists
    ///
    /// # Returns
    ///
    /// * `Ok(Submission)` - Completed (sync) or pending (async) record
    /// * `Err(InvalidRequest)` - Validation failed, nothing was written
    /// * `Err(AccountNotFound | InsufficientFunds)` - From the engine on the
    ///   sync path, or from the pre-checks on the async path
    pub async fn submit_transaction(
        &self,
        account_id: &AccountId,
        request: &TransactionRequest,
        prefer_async: bool,
    ) -> Result<Submission, LedgerError> {
        let (kind, request) = request.validate_submission()?;

        let channel = match &self.channel {
            Some(channel) if prefer_async && channel.is_healthy() => channel,
            _ => return self.submit_sync(account_id, &request).await,
        };

        let account = self.balances.get_account(account_id).await?;
        if kind == TransactionKind::Withdraw && account.balance < request.amount {
            return Err(LedgerError::insufficient_funds(
                account_id,
                account.balance,
                request.amount,
            ));
        }

        let pending = Transaction::pending(
            account_id.clone(),
            kind,
            request.amount,
            account.balance,
            request.description.clone(),
        );
        let pending = self.engine.create_pending(pending).await?;

        let published = match Intent::for_pending(&pending).encode() {
            Ok(body) => channel.publish(pending.id.as_str(), body).await,
            Err(encode_error) => Err(encode_error),
        };

        match published {
            Ok(()) => {
                info!(
                    transaction_id = %pending.id,
                    account_id = %account_id,
                    %kind,
                    amount = %request.amount,
                    "Transaction queued"
                );
                Ok(Submission {
                    transaction: pending,
                    mode: ProcessingMode::Async,
                })
            }
            Err(publish_error) => {
                warn!(
                    transaction_id = %pending.id,
                    error = %publish_error,
                    "Failed to publish intent, falling back to sync processing"
                );
                if let Err(mark_error) = self
                    .engine
                    .fail_pending(&pending.id, QUEUE_UNAVAILABLE_REASON)
                    .await
                {
                    warn!(
                        transaction_id = %pending.id,
                        error = %mark_error,
                        "Failed to mark unpublished transaction failed"
                    );
                }
                self.submit_sync(account_id, &request).await
            }
        }
    }

    async fn submit_sync(
        &self,
        account_id: &AccountId,
        request: &TransactionRequest,
    ) -> Result<Submission, LedgerError> {
        let transaction = self.engine.process_sync(account_id, request).await?;
        Ok(Submission {
            transaction,
            mode: ProcessingMode::Sync,
        })
    }

    pub async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Transaction, LedgerError> {
        self.ledger.get(transaction_id).await
    }

    /// Page through an account's history, newest first
    ///
    /// `page` below 1 is treated as 1, `limit` below 1 as 10, and `limit` is
    /// capped at 100.
    pub async fn get_history(
        &self,
        account_id: &AccountId,
        page: i64,
        limit: i64,
    ) -> Result<HistoryPage, LedgerError> {
        self.balances.get_account(account_id).await?;

        let page = usize::try_from(page).ok().filter(|p| *p > 0).unwrap_or(1);
        let limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0)
            .map_or(DEFAULT_HISTORY_LIMIT, |l| l.min(MAX_HISTORY_LIMIT));

        self.ledger.list_by_account(account_id, page, limit).await
    }
}
