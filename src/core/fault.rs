//! Fault-injecting store wrappers
//!
//! Wrap a real store and make chosen operations fail on demand, so the
//! engine's compensation and retry paths can be driven deterministically:
//! - fail the next N calls of one operation
//! - let N calls through, then fail the following M
//! - take the whole backend down (every operation fails)
//!
//! An injected failure never reaches the wrapped store, so it behaves like a
//! write that was never applied.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};

use super::traits::{BalanceChange, BalanceStore, HistoryPage, LedgerStore};
use crate::types::{
    Account, AccountId, LedgerError, Transaction, TransactionId, TransactionKind,
    TransactionStatus,
};

/// Countdown deciding which calls of one operation fail
#[derive(Debug, Default, Clone, Copy)]
struct FaultPlan {
    /// Calls still allowed through before failures start
    skip: usize,
    /// Calls that fail once `skip` is exhausted
    fail: usize,
}

impl FaultPlan {
    fn should_fail(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        if self.fail > 0 {
            self.fail -= 1;
            return true;
        }
        false
    }
}

#[derive(Debug, Default)]
struct Switch {
    plan: Mutex<FaultPlan>,
}

impl Switch {
    fn arm(&self, skip: usize, fail: usize) {
        *self.plan.lock() = FaultPlan { skip, fail };
    }

    fn trip(&self) -> bool {
        self.plan.lock().should_fail()
    }
}

fn injected(store: &'static str, operation: &str) -> LedgerError {
    LedgerError::storage(store, format!("injected fault in {}", operation))
}

/// Balance store that fails on demand
#[derive(Debug, Default)]
pub struct FaultInjectingBalanceStore<S> {
    inner: S,
    down: AtomicBool,
    updates: Switch,
}

impl<S: BalanceStore> FaultInjectingBalanceStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            updates: Switch::default(),
        }
    }

    /// Make every operation fail until called again with `false`
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail the next `count` atomic updates
    pub fn fail_next_updates(&self, count: usize) {
        self.updates.arm(0, count);
    }

    /// Let `skip` atomic updates succeed, then fail the next `count`
    ///
    /// `fail_updates_after(1, 1)` lets the forward mutation through and fails
    /// its compensation.
    pub fn fail_updates_after(&self, skip: usize, count: usize) {
        self.updates.arm(skip, count);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_up(&self, operation: &str) -> Result<(), LedgerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(injected("balance", operation));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: BalanceStore> BalanceStore for FaultInjectingBalanceStore<S> {
    async fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        self.check_up("create_account")?;
        self.inner.create_account(account).await
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.check_up("get_account")?;
        self.inner.get_account(account_id).await
    }

    async fn atomic_update(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        self.check_up("atomic_update")?;
        if self.updates.trip() {
            return Err(injected("balance", "atomic_update"));
        }
        self.inner.atomic_update(account_id, kind, amount).await
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.check_up("ping")?;
        self.inner.ping().await
    }
}

/// Ledger store that fails on demand
#[derive(Debug, Default)]
pub struct FaultInjectingLedgerStore<S> {
    inner: S,
    down: AtomicBool,
    creates: Switch,
    updates: Switch,
    status_updates: Switch,
}

impl<S: LedgerStore> FaultInjectingLedgerStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            creates: Switch::default(),
            updates: Switch::default(),
            status_updates: Switch::default(),
        }
    }

    /// Make every operation fail until called again with `false`
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail the next `count` record creations
    pub fn fail_next_creates(&self, count: usize) {
        self.creates.arm(0, count);
    }

    /// Fail the next `count` full-record updates
    pub fn fail_next_updates(&self, count: usize) {
        self.updates.arm(0, count);
    }

    /// Fail the next `count` status-only updates
    pub fn fail_next_status_updates(&self, count: usize) {
        self.status_updates.arm(0, count);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_up(&self, operation: &str) -> Result<(), LedgerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(injected("ledger", operation));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for FaultInjectingLedgerStore<S> {
    async fn create(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.check_up("create")?;
        if self.creates.trip() {
            return Err(injected("ledger", "create"));
        }
        self.inner.create(transaction).await
    }

    async fn update(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.check_up("update")?;
        if self.updates.trip() {
            return Err(injected("ledger", "update"));
        }
        self.inner.update(transaction).await
    }

    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: Option<String>,
    ) -> Result<(), LedgerError> {
        self.check_up("update_status")?;
        if self.status_updates.trip() {
            return Err(injected("ledger", "update_status"));
        }
        self.inner
            .update_status(transaction_id, status, error_message)
            .await
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Transaction, LedgerError> {
        self.check_up("get")?;
        self.inner.get(transaction_id).await
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: usize,
        limit: usize,
    ) -> Result<HistoryPage, LedgerError> {
        self.check_up("list_by_account")?;
        self.inner.list_by_account(account_id, page, limit).await
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.check_up("ping")?;
        self.inner.ping().await
    }
}
