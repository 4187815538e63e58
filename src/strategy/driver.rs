//! Applies parsed ledger commands to a `LedgerService`
//!
//! Input files name accounts by label. The driver owns the mapping from
//! labels to the account IDs the ledger assigns, and builds the final
//! per-account summaries written to the output.
//!
//! A queued submission is waited on until it settles, so the rows of one
//! label take effect in file order whichever path applies them.

use crate::core::{LedgerService, ProcessingMode, MAX_HISTORY_LIMIT};
use crate::io::csv_format::{AccountSummary, LedgerCommand};
use crate::types::{AccountId, LedgerError, TransactionStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, error};

/// How long a queued row is waited on before it is reported unsettled
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Label-addressed front end over a `LedgerService`
///
/// Safe to share across tasks; commands for different labels may be applied
/// concurrently.
pub struct LedgerDriver {
    service: LedgerService,
    labels: DashMap<String, AccountId>,
    settle_timeout: Duration,
}

impl LedgerDriver {
    pub fn new(service: LedgerService) -> Self {
        Self {
            service,
            labels: DashMap::new(),
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    pub fn with_settle_timeout(mut self, settle_timeout: Duration) -> Self {
        self.settle_timeout = settle_timeout;
        self
    }

    pub fn service(&self) -> &LedgerService {
        &self.service
    }

    /// Account ID assigned to `label`, if it has been opened
    pub fn account_id(&self, label: &str) -> Option<AccountId> {
        self.labels.get(label).map(|entry| entry.value().clone())
    }

    /// Apply one command
    ///
    /// # Arguments
    ///
    /// * `command` - The parsed row
    /// * `prefer_async` - Queue submissions when the service has a healthy
    ///   channel
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the account was opened or the transaction completed
    /// * `Err(DuplicateLabel | UnknownLabel)` for rows that do not fit the
    ///   accounts opened so far
    /// * `Err(TransactionFailed)` - A queued transaction was failed by its
    ///   worker
    /// * `Err(SettleTimeout)` - A queued transaction was still pending after
    ///   the settle timeout
    /// * `Err(_)` - Whatever the service rejected the row with
    pub async fn apply(&self, command: LedgerCommand, prefer_async: bool) -> Result<(), LedgerError> {
        match command {
            LedgerCommand::Open {
                label,
                owner,
                initial_balance,
            } => {
                if self.labels.contains_key(&label) {
                    return Err(LedgerError::DuplicateLabel { label });
                }
                let account = self.service.create_account(&owner, initial_balance).await?;
                // The shard guard must not be held across the await above
                match self.labels.entry(label) {
                    Entry::Occupied(occupied) => Err(LedgerError::DuplicateLabel {
                        label: occupied.key().clone(),
                    }),
                    Entry::Vacant(vacant) => {
                        debug!(label = %vacant.key(), account_id = %account.id, "Label bound");
                        vacant.insert(account.id);
                        Ok(())
                    }
                }
            }
            LedgerCommand::Submit { label, request } => {
                let account_id = self
                    .account_id(&label)
                    .ok_or(LedgerError::UnknownLabel { label })?;
                let submission = self
                    .service
                    .submit_transaction(&account_id, &request, prefer_async)
                    .await?;
                if submission.mode == ProcessingMode::Sync {
                    return Ok(());
                }

                let settled = self
                    .service
                    .wait_settled(&submission.transaction.id, self.settle_timeout)
                    .await?;
                match settled.status {
                    TransactionStatus::Failed => Err(LedgerError::TransactionFailed {
                        transaction_id: settled.id,
                        message: settled.error_message.unwrap_or_default(),
                    }),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Log and clear the engine's reconciliation entries, returning how many
    /// there were
    pub fn report_unreconciled(&self) -> usize {
        let entries = self.service.engine().reconciliation().drain();
        for entry in &entries {
            error!(
                transaction_id = %entry.transaction_id,
                account_id = %entry.account_id,
                kind = %entry.kind,
                amount = %entry.amount,
                "Unreconciled balance mutation"
            );
        }
        entries.len()
    }

    /// Summaries of every opened account
    ///
    /// `transactions` counts completed ledger records only, so rejected and
    /// failed submissions do not show up regardless of the path they took.
    pub async fn summaries(&self) -> Result<Vec<AccountSummary>, LedgerError> {
        let bound: Vec<(String, AccountId)> = self
            .labels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut summaries = Vec::with_capacity(bound.len());
        for (label, account_id) in bound {
            let account = self.service.get_account(&account_id).await?;
            let transactions = self.completed_count(&account_id).await?;
            summaries.push(AccountSummary {
                label,
                owner: account.owner,
                balance: account.balance,
                transactions,
            });
        }
        Ok(summaries)
    }

    async fn completed_count(&self, account_id: &AccountId) -> Result<usize, LedgerError> {
        let limit = MAX_HISTORY_LIMIT as i64;
        let mut page = 1;
        let mut seen = 0;
        let mut completed = 0;

        loop {
            let history = self.service.get_history(account_id, page, limit).await?;
            seen += history.transactions.len();
            completed += history
                .transactions
                .iter()
                .filter(|t| t.status == TransactionStatus::Completed)
                .count();
            if history.transactions.is_empty() || seen >= history.total {
                return Ok(completed);
            }
            page += 1;
        }
    }
}
