//! Reconciliation log
//!
//! When a ledger write fails and the compensating balance mutation fails as
//! well, the balance store holds a mutation that no ledger record explains.
//! The engine cannot repair that on its own. It records the divergence here
//! so an operator can reconcile the two stores by hand.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{AccountId, TransactionId, TransactionKind};

/// One unexplained balance mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationEntry {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    /// The mutation that was applied and could not be undone
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Why the ledger write failed
    pub ledger_error: String,
    /// Why the compensation failed
    pub compensation_error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Unresolved divergences, kept until drained
#[derive(Debug, Default)]
pub struct ReconciliationLog {
    entries: Mutex<Vec<ReconciliationEntry>>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ReconciliationEntry) {
        self.entries.lock().push(entry);
    }

    /// Remove and return every recorded divergence
    pub fn drain(&self) -> Vec<ReconciliationEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Snapshot of every divergence recorded so far
    pub fn entries(&self) -> Vec<ReconciliationEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
